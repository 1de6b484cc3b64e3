use crate::{
    assets::MotionMatchingSetup,
    player::{MotionMatchingPlayer, PlayerInputMode},
};
use bevy::{
    asset::Assets,
    color::palettes::css,
    ecs::{
        entity::Entity,
        hierarchy::Children,
        name::Name,
        system::{Query, Res},
    },
    gizmos::gizmos::Gizmos,
    log::{error, info, warn},
    math::Isometry3d,
    time::Time,
    transform::components::Transform,
};
use motion_matching_core::{
    controller::MotionMatchingController, math::FORWARD, pose_set::Foot, skeleton::Skeleton,
};
use std::collections::VecDeque;

/// Creates the controllers of players whose setup finished loading.
pub fn initialize_players(
    setups: Res<Assets<MotionMatchingSetup>>,
    mut players: Query<(Entity, &Transform, &mut MotionMatchingPlayer)>,
) {
    for (entity, transform, mut player) in &mut players {
        if player.controller.is_some() || player.error.is_some() {
            continue;
        }
        let Some(setup) = player.setup.as_ref().and_then(|handle| setups.get(handle)) else {
            continue;
        };

        let result = match player.mode {
            PlayerInputMode::Tracked => {
                // Wait for the first tracker frame to place the character.
                let Some(trackers) = player.tracker_frame else {
                    continue;
                };
                MotionMatchingController::tracked(
                    setup.database.clone(),
                    setup.squat_variants.clone(),
                    setup.config.clone(),
                    &trackers,
                    player.direction_model.clone(),
                )
            }
            PlayerInputMode::Directed => MotionMatchingController::directed(
                setup.database.clone(),
                setup.config.clone(),
                *transform,
            ),
        };

        match result {
            Ok(controller) => {
                info!("Motion matching player {entity} started");
                player.controller = Some(controller);
                player.targets = None;
            }
            Err(err) => {
                error!("Motion matching player {entity} could not start: {err}");
                player.error = Some(err.to_string());
            }
        }
    }
}

/// Runs one controller tick per player.
pub fn step_players(time: Res<Time>, mut players: Query<&mut MotionMatchingPlayer>) {
    let dt = time.delta_secs();
    let now = time.elapsed_secs();
    players.par_iter_mut().for_each(|mut player| {
        if player.paused {
            return;
        }
        player.push_directed_input();
        let player = &mut *player;
        let Some(controller) = player.controller.as_mut() else {
            return;
        };
        if player.calibration_requested {
            player.calibration_requested = false;
            controller.calibrate(now);
        }
        let output = controller.step(player.tracker_frame.as_ref(), dt);
        player.joints = output.joints;
        player.events = output.events;
    });
}

/// Writes the last pose onto the player entity and its named descendants.
pub fn apply_poses(
    mut players: Query<(Entity, &mut MotionMatchingPlayer)>,
    names: Query<&Name>,
    children: Query<&Children>,
    mut transforms: Query<&mut Transform>,
) {
    for (root, mut player) in &mut players {
        let player = &mut *player;
        let Some(controller) = player.controller.as_ref() else {
            continue;
        };
        if player.joints.is_empty() {
            continue;
        }
        let skeleton = controller.skeleton();
        let targets = player
            .targets
            .get_or_insert_with(|| resolve_targets(root, skeleton, &names, &children));

        let pose = controller.pose();
        for (joint, target) in targets.iter().enumerate() {
            let Some(target) = *target else {
                continue;
            };
            let Ok(mut transform) = transforms.get_mut(target) else {
                continue;
            };
            *transform = if target == root {
                player.joints[joint]
            } else {
                pose.local_transform(joint)
            };
        }
    }
}

/// Maps every joint to the descendant of `root` with the same name, the
/// simulation bone to `root` itself.
fn resolve_targets(
    root: Entity,
    skeleton: &Skeleton,
    names: &Query<&Name>,
    children: &Query<&Children>,
) -> Vec<Option<Entity>> {
    let mut targets = vec![None; skeleton.len()];
    if let Some(first) = targets.first_mut() {
        *first = Some(root);
    }

    let mut queue: VecDeque<Entity> = children
        .get(root)
        .map(|children| children.into_iter().copied().collect())
        .unwrap_or_default();
    while let Some(entity) = queue.pop_front() {
        if let Ok(name) = names.get(entity) {
            if let Some(joint) = skeleton.find(name.as_str()).filter(|&joint| joint != 0) {
                if targets[joint].is_none() {
                    targets[joint] = Some(entity);
                }
            }
        }
        if let Ok(grandchildren) = children.get(entity) {
            queue.extend(grandchildren.into_iter().copied());
        }
    }

    let missing = targets.iter().filter(|target| target.is_none()).count();
    if missing > 0 {
        warn!("Motion matching player {root}: {missing} joints have no matching entity");
    }
    targets
}

/// Draws predicted trajectories, the character root and foot anchors.
pub fn motion_matching_gizmos(players: Query<&MotionMatchingPlayer>, mut gizmos: Gizmos) {
    for player in &players {
        if !player.debug_gizmos {
            continue;
        }
        let Some(controller) = player.controller.as_ref() else {
            continue;
        };

        let root = controller.root();
        let mut previous = root.translation;
        for sample in controller.predictions() {
            let position = sample.position.with_y(root.translation.y);
            gizmos.line(previous, position, css::ORANGE);
            gizmos.arrow(position, position + sample.direction * 0.3, css::RED);
            previous = position;
        }
        gizmos.arrow(
            root.translation,
            root.translation + root.rotation * FORWARD * 0.5,
            css::AQUA,
        );

        let foot_lock = &controller.state().foot_lock;
        for foot in Foot::ALL {
            if let Some(anchor) = foot_lock.anchor(foot) {
                gizmos.sphere(Isometry3d::from_translation(anchor), 0.04, css::LIME);
            }
        }
    }
}
