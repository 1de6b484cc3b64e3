use bevy::{asset::Asset, reflect::TypePath};
use motion_matching_core::{
    config::MotionMatchingConfig, database::MotionDatabase, feature_set::FeatureSet,
    pose_set::PoseSet,
};
use std::sync::Arc;

/// A pose set loaded from a `*.poses.mpk` file.
#[derive(Asset, TypePath, Clone, Debug)]
pub struct PoseSetAsset(pub Arc<PoseSet>);

/// A feature set loaded from a `*.features.mpk` file.
#[derive(Asset, TypePath, Clone, Debug)]
pub struct FeatureSetAsset(pub Arc<FeatureSet>);

/// Everything a [`MotionMatchingPlayer`](crate::player::MotionMatchingPlayer)
/// needs, defined in `*.mm.ron` files:
/// ```ron
/// (
///     poses: "motion/locomotion.poses.mpk",
///     features: "motion/locomotion.features.mpk",
///     squat_variants: [
///         (
///             poses: "motion/crouch.poses.mpk",
///             features: "motion/crouch.features.mpk",
///         ),
///     ],
///     config: (
///         search_interval: 10,
///         squat: (variant_ratios: [0.75]),
///     ),
/// )
/// ```
#[derive(Asset, TypePath, Clone, Debug)]
pub struct MotionMatchingSetup {
    pub database: MotionDatabase,
    /// One per entry of `config.squat.variant_ratios`.
    pub squat_variants: Vec<MotionDatabase>,
    pub config: MotionMatchingConfig,
}
