use crate::{
    assets::{FeatureSetAsset, MotionMatchingSetup, PoseSetAsset},
    input::{TrackedDevices, gather_tracker_frames},
    loaders::{FeatureSetLoader, MotionMatchingSetupLoader, PoseSetLoader},
    player::{MotionMatchingPlayer, PlayerInputMode},
    systems::{apply_poses, initialize_players, motion_matching_gizmos, step_players},
};
use bevy::{
    app::{App, FixedUpdate, Plugin, PostUpdate},
    asset::AssetApp,
    ecs::{
        intern::Interned,
        schedule::{IntoScheduleConfigs, ScheduleLabel, SystemSet},
    },
    transform::TransformSystems,
};
use motion_matching_core::{
    config::{DirectionConfig, MotionMatchingConfig, SquatConfig},
    feature_set::{FeatureDescriptor, FeatureKind},
    foot_lock::{FootLockConfig, LegJointNames},
    trajectory::{AdjustmentConfig, PredictionTuning, TrackerFrame},
};

/// Adds motion matching support to an app
pub struct MotionMatchingPlugin {
    /// Where the controllers tick; a fixed-rate schedule keeps the search
    /// cadence independent of the frame rate.
    pub step_schedule: Interned<dyn ScheduleLabel>,
    pub final_schedule: Interned<dyn ScheduleLabel>,
}

impl Default for MotionMatchingPlugin {
    fn default() -> Self {
        Self {
            step_schedule: FixedUpdate.intern(),
            final_schedule: PostUpdate.intern(),
        }
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, SystemSet)]
pub enum MotionMatchingSet {
    /// Controller ticks, in the step schedule
    Step,
    /// Writing poses to the scene, before transform propagation
    Final,
}

impl Plugin for MotionMatchingPlugin {
    fn build(&self, app: &mut App) {
        self.register_assets(app);
        self.register_types(app);

        app.configure_sets(
            self.final_schedule,
            MotionMatchingSet::Final.before(TransformSystems::Propagate),
        );

        app.add_systems(
            self.step_schedule,
            (gather_tracker_frames, initialize_players, step_players)
                .chain()
                .in_set(MotionMatchingSet::Step),
        );

        app.add_systems(
            self.final_schedule,
            (apply_poses, motion_matching_gizmos)
                .chain()
                .in_set(MotionMatchingSet::Final),
        );
    }
}

impl MotionMatchingPlugin {
    /// Registers asset types and their loaders
    fn register_assets(&self, app: &mut App) {
        app.init_asset::<PoseSetAsset>()
            .init_asset_loader::<PoseSetLoader>();
        app.init_asset::<FeatureSetAsset>()
            .init_asset_loader::<FeatureSetLoader>();
        app.init_asset::<MotionMatchingSetup>()
            .init_asset_loader::<MotionMatchingSetupLoader>();
    }

    fn register_types(&self, app: &mut App) {
        app //
            .register_type::<MotionMatchingPlayer>()
            .register_type::<PlayerInputMode>()
            .register_type::<TrackedDevices>()
            .register_type::<TrackerFrame>()
            .register_type::<MotionMatchingConfig>()
            .register_type::<FeatureDescriptor>()
            .register_type::<FeatureKind>()
            .register_type::<PredictionTuning>()
            .register_type::<AdjustmentConfig>()
            .register_type::<FootLockConfig>()
            .register_type::<LegJointNames>()
            .register_type::<SquatConfig>()
            .register_type::<DirectionConfig>();
    }
}
