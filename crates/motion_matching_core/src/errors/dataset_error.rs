use thiserror::Error;

use super::ConfigError;

/// Problems found while assembling a [`PoseSet`] from motion clips.
///
/// [`PoseSet`]: crate::pose_set::PoseSet
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DatasetError {
    #[error("frame time must be positive, got {0}")]
    InvalidFrameTime(f32),
    #[error("clip `{0}` has no frames")]
    EmptyClip(String),
    #[error("frame {frame} has {found} joints, the skeleton has {expected}")]
    JointCountMismatch {
        frame: usize,
        expected: usize,
        found: usize,
    },
    #[error("clip range {start}..{end} does not fit {pose_count} poses")]
    InvalidClipRange {
        start: usize,
        end: usize,
        pose_count: usize,
    },
    #[error("clips `{first}` and `{second}` share frames")]
    OverlappingClips { first: String, second: String },
    #[error("pose set has {poses} frames but feature set has {features}")]
    FrameCountMismatch { poses: usize, features: usize },
    #[error("the pose set contains no poses")]
    Empty,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Problems found while extracting or normalizing a [`FeatureSet`].
///
/// [`FeatureSet`]: crate::feature_set::FeatureSet
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeatureSetError {
    #[error("feature dimension {dimension} has zero variance, the dataset is broken")]
    ZeroVariance { dimension: usize },
    #[error("no frame is valid, cannot compute normalization")]
    NoValidFrames,
    #[error("expected {expected} feature values, found {found}")]
    SizeMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
