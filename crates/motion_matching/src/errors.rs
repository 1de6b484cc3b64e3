use motion_matching_core::errors::{ConfigError, MotionMatchingError, PersistenceError};
use thiserror::Error;

/// Possible errors that can be produced by the motion matching asset loaders
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AssetLoaderError {
    #[error("Could not read asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse RON: {0}")]
    RonSpannedError(#[from] ron::error::SpannedError),
    #[error("Could not decode blob: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Could not assemble motion database: {0}")]
    MotionMatching(#[from] MotionMatchingError),
    #[error("Could not complete direct asset load: {0}")]
    LoadDirectError(#[from] bevy::asset::LoadDirectError),
}
