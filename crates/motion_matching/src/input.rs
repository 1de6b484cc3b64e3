use crate::player::MotionMatchingPlayer;
use bevy::{
    ecs::{component::Component, entity::Entity, system::Query},
    log::warn,
    prelude::ReflectComponent,
    reflect::Reflect,
    transform::components::GlobalTransform,
};
use motion_matching_core::trajectory::TrackerFrame;

/// Entities whose global transforms follow the headset and both hand
/// controllers, usually maintained by an XR integration.
#[derive(Component, Reflect, Clone, Copy, Debug, PartialEq)]
#[reflect(Component)]
pub struct TrackedDevices {
    pub head: Entity,
    pub left_hand: Entity,
    pub right_hand: Entity,
}

/// Copies the tracker transforms into the players.
pub fn gather_tracker_frames(
    mut players: Query<(&TrackedDevices, &mut MotionMatchingPlayer)>,
    trackers: Query<&GlobalTransform>,
) {
    for (devices, mut player) in &mut players {
        let transforms = [devices.head, devices.left_hand, devices.right_hand]
            .map(|entity| trackers.get(entity).ok().map(|global| global.compute_transform()));
        let [Some(head), Some(left_hand), Some(right_hand)] = transforms else {
            warn!("Tracked devices {devices:?} are missing a GlobalTransform");
            continue;
        };
        player.tracker_frame = Some(TrackerFrame {
            head,
            left_hand,
            right_hand,
        });
    }
}
