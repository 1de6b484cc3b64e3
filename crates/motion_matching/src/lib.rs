//! # Motion Matching
//!
//! Bevy integration of [`motion_matching_core`]: characters animated by
//! searching a motion database every few ticks, following a VR headset or
//! a velocity set from code.
//!
//! Three asset types are registered:
//! - [`PoseSetAsset`](assets::PoseSetAsset), `*.poses.mpk`: the poses of
//!   every database frame.
//! - [`FeatureSetAsset`](assets::FeatureSetAsset), `*.features.mpk`: the
//!   feature vectors searched at runtime.
//! - [`MotionMatchingSetup`](assets::MotionMatchingSetup), `*.mm.ron`: points
//!   to the two blobs (and to optional crouched variants) and holds the
//!   tuning. Feature sets extracted with other features than the configured
//!   ones are extracted again while loading.
//!
//! Add [`MotionMatchingPlayer`](player::MotionMatchingPlayer) to the root of
//! a character hierarchy whose entity names match the skeleton joints, plus
//! [`TrackedDevices`](input::TrackedDevices) for tracker-driven characters:
//! ```ignore
//! commands.spawn((
//!     SceneRoot(asset_server.load("models/avatar.glb#Scene0")),
//!     MotionMatchingPlayer::new().with_setup(asset_server.load("motion/avatar.mm.ron")),
//!     TrackedDevices {
//!         head,
//!         left_hand,
//!         right_hand,
//!     },
//! ));
//! ```

pub mod assets;
pub mod errors;
pub mod input;
pub mod loaders;
pub mod player;
pub mod plugin;
mod systems;

pub use motion_matching_core;

pub mod prelude {
    use super::*;
    pub use assets::*;
    pub use input::TrackedDevices;
    pub use motion_matching_core::prelude::*;
    pub use player::*;
    pub use plugin::*;
}
