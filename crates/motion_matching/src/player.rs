use crate::assets::MotionMatchingSetup;
use bevy::{
    asset::Handle,
    ecs::{component::Component, entity::Entity},
    math::{Quat, Vec3},
    prelude::ReflectComponent,
    reflect::Reflect,
};
use motion_matching_core::{
    controller::{ControllerEvent, MotionMatchingController},
    direction::DirectionModel,
    trajectory::{CharacterInput, TrackerFrame},
};
use std::sync::Arc;

/// Where a player takes its trajectory from.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq)]
pub enum PlayerInputMode {
    /// From the [`TrackedDevices`](crate::input::TrackedDevices) on the same
    /// entity.
    #[default]
    Tracked,
    /// From [`MotionMatchingPlayer::set_desired_velocity`] and
    /// [`MotionMatchingPlayer::set_desired_facing`].
    Directed,
}

/// Motion matching playback controls
///
/// The entity holding the player is moved to the character root every tick
/// and its named descendants are posed after the skeleton joints. It is
/// expected to have no parent.
#[derive(Component, Default, Reflect)]
#[reflect(Component)]
pub struct MotionMatchingPlayer {
    pub(crate) setup: Option<Handle<MotionMatchingSetup>>,
    pub(crate) mode: PlayerInputMode,
    pub(crate) paused: bool,
    /// Draw predicted trajectory and foot anchors
    pub debug_gizmos: bool,

    pub(crate) desired_velocity: Vec3,
    pub(crate) desired_facing: Option<Quat>,
    pub(crate) calibration_requested: bool,

    #[reflect(ignore)]
    pub(crate) controller: Option<MotionMatchingController>,
    #[reflect(ignore)]
    pub(crate) direction_model: Option<Arc<dyn DirectionModel>>,
    #[reflect(ignore)]
    pub(crate) tracker_frame: Option<TrackerFrame>,
    /// Skeleton joint to entity, resolved once the hierarchy is spawned
    #[reflect(ignore)]
    pub(crate) targets: Option<Vec<Option<Entity>>>,
    #[reflect(ignore)]
    pub(crate) joints: Vec<bevy::transform::components::Transform>,
    #[reflect(ignore)]
    pub(crate) events: Vec<ControllerEvent>,
    /// Error that stopped the controller from being created
    pub(crate) error: Option<String>,
}

impl MotionMatchingPlayer {
    /// Create a new player, with no setup to play
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the setup to play
    pub fn with_setup(mut self, setup: Handle<MotionMatchingSetup>) -> Self {
        self.setup = Some(setup);
        self
    }

    /// Set where the trajectory comes from, [`PlayerInputMode::Tracked`] by
    /// default
    pub fn with_mode(mut self, mode: PlayerInputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Predict the facing from all trackers with `model` when the setup
    /// enables it.
    pub fn with_direction_model(mut self, model: Arc<dyn DirectionModel>) -> Self {
        self.direction_model = Some(model);
        self
    }

    /// Start playing `setup`, dropping the current controller state.
    pub fn start(&mut self, setup: Handle<MotionMatchingSetup>) -> &mut Self {
        self.setup = Some(setup);
        self.controller = None;
        self.error = None;
        self.paused = false;
        self
    }

    /// Stop ticking the controller. The last pose stays applied.
    pub fn pause(&mut self) -> &mut Self {
        self.paused = true;
        self
    }

    /// Continue ticking from where the player was paused
    pub fn resume(&mut self) -> &mut Self {
        self.paused = false;
        self
    }

    /// Whether the player is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Planar velocity for [`PlayerInputMode::Directed`] players.
    pub fn set_desired_velocity(&mut self, velocity: Vec3) -> &mut Self {
        self.desired_velocity = velocity;
        self
    }

    /// Facing for [`PlayerInputMode::Directed`] players, yaw only. Until set
    /// the character keeps the facing it started with.
    pub fn set_desired_facing(&mut self, facing: Quat) -> &mut Self {
        self.desired_facing = Some(facing);
        self
    }

    /// Feed the trackers directly instead of through
    /// [`TrackedDevices`](crate::input::TrackedDevices).
    pub fn set_tracker_frame(&mut self, frame: TrackerFrame) -> &mut Self {
        self.tracker_frame = Some(frame);
        self
    }

    /// Take the current head height as the standing eye height on the next
    /// tick.
    pub fn request_calibration(&mut self) -> &mut Self {
        self.calibration_requested = true;
        self
    }

    /// The running controller, once the setup has loaded
    pub fn controller(&self) -> Option<&MotionMatchingController> {
        self.controller.as_ref()
    }

    /// Mutable access to the running controller, e.g. to adjust its root
    pub fn controller_mut(&mut self) -> Option<&mut MotionMatchingController> {
        self.controller.as_mut()
    }

    /// Events of the last tick.
    pub fn events(&self) -> &[ControllerEvent] {
        &self.events
    }

    /// If the setup could not be played return why, otherwise `None`.
    pub fn get_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn push_directed_input(&mut self) {
        let (velocity, facing) = (self.desired_velocity, self.desired_facing);
        if let Some(CharacterInput::Directed(input)) =
            self.controller.as_mut().map(MotionMatchingController::input_mut)
        {
            input.set_desired_velocity(velocity);
            if let Some(facing) = facing {
                input.set_desired_facing(facing);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_and_playback_controls() {
        let mut player = MotionMatchingPlayer::new().with_mode(PlayerInputMode::Directed);
        assert_eq!(player.mode, PlayerInputMode::Directed);
        assert!(player.controller().is_none());

        assert!(player.pause().is_paused());
        assert!(!player.resume().is_paused());

        player.set_desired_velocity(Vec3::Z).request_calibration();
        assert_eq!(player.desired_velocity, Vec3::Z);
        assert!(player.calibration_requested);
        assert!(player.get_error().is_none());
    }
}
