use thiserror::Error;

/// Problems with the skeleton or the configuration, detected at setup time.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("required joint `{0}` is missing from the skeleton")]
    MissingJoint(String),
    #[error("skeleton has no joints")]
    EmptySkeleton,
    #[error("the root joint must not have a parent")]
    RootHasParent,
    #[error("joint {joint} has parent {parent}, parents must precede their children")]
    InvalidTopology { joint: usize, parent: usize },
    #[error("expected {expected} feature weights, found {found}")]
    WeightCountMismatch { expected: usize, found: usize },
    #[error("trajectory feature `{feature}` predicts frames {found:?}, the controller predicts {expected:?}")]
    PredictionFramesMismatch {
        feature: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("feature layout has no dimensions")]
    EmptyLayout,
    #[error("direction model expects {found} inputs, the trackers provide {expected}")]
    DirectionInputMismatch { expected: usize, found: usize },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("could not parse RON: {0}")]
    Ron(#[from] ron::error::SpannedError),
}
