use thiserror::Error;

use super::{DatasetError, FeatureSetError};

/// Errors reading or writing the binary dataset blobs.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("could not access dataset file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode dataset: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("could not decode dataset: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("unsupported dataset version {found}, expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("corrupt dataset: {0}")]
    Corrupt(String),
    #[error("decoded pose set is inconsistent: {0}")]
    Dataset(#[from] DatasetError),
    #[error("decoded feature set is inconsistent: {0}")]
    FeatureSet(#[from] FeatureSetError),
}
