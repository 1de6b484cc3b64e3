//! # Motion matching core
//!
//! Engine-agnostic pieces of a tracker-driven motion matching character:
//!
//! - [`PoseSet`](pose_set::PoseSet): the animation database, one pose per
//!   frame, grouped in clips. Built with a
//!   [`PoseSetBuilder`](pose_set::PoseSetBuilder) from decoded clips.
//! - [`FeatureSet`](feature_set::FeatureSet): one normalized feature vector
//!   per frame, extracted from a pose set following a list of
//!   [`FeatureDescriptor`](feature_set::FeatureDescriptor)s.
//! - [`MotionMatcher`](matching::MotionMatcher): weighted nearest-neighbour
//!   search with a bias towards the frame already playing.
//! - [`TrajectoryPredictor`](trajectory::TrajectoryPredictor): spring-damper
//!   prediction of where the character will be, fed by a VR headset or by
//!   code.
//! - [`Inertializer`](inertialization::Inertializer) and
//!   [`FootLockSolver`](foot_lock::FootLockSolver): smooth transitions and
//!   planted feet.
//! - [`MotionMatchingController`](controller::MotionMatchingController): the
//!   per-tick loop that ties everything together.
//!
//! Pose and feature sets are stored as MessagePack blobs
//! (`*.poses.mpk`, `*.features.mpk`), the tuning as RON:
//! ```ron
//! (
//!     search_interval: 10,
//!     responsiveness: 0.8,
//!     foot_lock: (unlock_distance: 0.2),
//!     squat: (variant_ratios: [0.75]),
//! )
//! ```

pub mod config;
pub mod controller;
pub mod database;
pub mod direction;
pub mod errors;
pub mod feature_set;
pub mod foot_lock;
pub mod ik;
pub mod inertialization;
pub mod matching;
pub mod math;
pub mod pose_set;
pub mod skeleton;
pub mod spring;
pub mod trajectory;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    use super::*;
    pub use config::*;
    pub use controller::{ControllerEvent, MotionMatchingController, StepOutput};
    pub use database::{DatabasePaths, MotionDatabase};
    pub use direction::{DirectionModel, DirectionPredictor};
    pub use errors::*;
    pub use feature_set::{FeatureDescriptor, FeatureKind, FeatureSet};
    pub use foot_lock::{FootLockConfig, LegJointNames};
    pub use pose_set::{ClipFrame, Foot, MotionClip, PoseSet, PoseSetBuilder};
    pub use skeleton::{Joint, Skeleton, SkeletonPose};
    pub use trajectory::{CharacterInput, DirectedInput, TrackedInput, TrackerFrame};
}
