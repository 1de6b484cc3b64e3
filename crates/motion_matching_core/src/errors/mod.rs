mod config_error;
mod dataset_error;
mod persistence_error;

pub use config_error::*;
pub use dataset_error::*;
pub use persistence_error::*;

use thiserror::Error;

/// Any error that can stop a motion matching setup from completing.
///
/// Runtime numeric problems never surface here: the per-tick loop recovers
/// from them locally and only logs.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MotionMatchingError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("feature set error: {0}")]
    FeatureSet(#[from] FeatureSetError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

pub type MotionMatchingResult<T> = Result<T, MotionMatchingError>;
