//! Synthetic skeleton, clips and trackers shared by the unit tests.

use crate::{
    config::MotionMatchingConfig,
    database::MotionDatabase,
    feature_set::{FeatureDescriptor, FeatureKind, FeatureLayout, FeatureSet, FeatureStats},
    foot_lock::LegJointNames,
    math::yaw_from_direction,
    pose_set::{ClipFrame, MotionClip, PoseSet, PoseSetBuilder},
    skeleton::{Joint, Skeleton},
    trajectory::TrackerFrame,
};
use bevy::{
    math::{Quat, Vec3},
    transform::components::Transform,
};
use std::f32::consts::TAU;

pub const LEFT_TOES: &str = "LeftToe";
pub const RIGHT_TOES: &str = "RightToe";

const FRAME_TIME: f32 = 1.0 / 60.0;

/// Simulation bone, hips, spine, head, hands and two legs. The left leg is
/// on `+X` and the toes rest on the ground.
pub fn biped_skeleton() -> Skeleton {
    let mut joints = vec![
        Joint::new("Root", None, Vec3::ZERO),
        Joint::new("Hips", Some(0), Vec3::new(0.0, 0.9, 0.0)),
        Joint::new("Spine", Some(1), Vec3::new(0.0, 0.25, 0.0)),
        Joint::new("Head", Some(2), Vec3::new(0.0, 0.5, 0.0)),
        Joint::new("LeftHand", Some(2), Vec3::new(0.3, 0.3, 0.0)),
        Joint::new("RightHand", Some(2), Vec3::new(-0.3, 0.3, 0.0)),
    ];
    for (side, x) in [("Left", 0.1), ("Right", -0.1)] {
        let upper = joints.len();
        joints.push(Joint::new(format!("{side}UpLeg"), Some(1), Vec3::new(x, 0.0, 0.0)));
        joints.push(Joint::new(format!("{side}Leg"), Some(upper), Vec3::new(0.0, -0.42, 0.0)));
        joints.push(Joint::new(format!("{side}Foot"), Some(upper + 1), Vec3::new(0.0, -0.42, 0.0)));
        joints.push(Joint::new(format!("{side}Toe"), Some(upper + 2), Vec3::new(0.0, -0.06, 0.1)));
    }
    Skeleton::new(joints).unwrap()
}

/// A single `walk` clip of `frames` frames at 60 fps: forward at 1.2 m/s
/// with some sway, a nodding head, swinging legs and alternating contacts.
pub fn walk_pose_set(frames: usize) -> PoseSet {
    let skeleton = biped_skeleton();
    let left = skeleton.require("LeftUpLeg").unwrap();
    let right = skeleton.require("RightUpLeg").unwrap();

    let clip_frames = (0..frames)
        .map(|frame| {
            let t = frame as f32 * FRAME_TIME;
            let phase = TAU * 1.5 * t;
            let mut rotations = vec![Quat::IDENTITY; skeleton.len()];
            rotations[0] = Quat::from_rotation_y(0.3 * (0.8 * t + 0.5).sin());
            rotations[3] = Quat::from_rotation_x(0.1 * (1.3 * t).sin());
            for (upper, phase) in [(left, phase), (right, phase + TAU / 2.0)] {
                rotations[upper] = Quat::from_rotation_x(0.4 * phase.sin())
                    * Quat::from_rotation_z(0.05 * phase.cos());
                rotations[upper + 1] = Quat::from_rotation_x(0.3 + 0.2 * phase.cos());
                rotations[upper + 2] = Quat::from_rotation_x(-0.15 * phase.sin());
            }
            let stance = phase.cos() > 0.0;
            ClipFrame::from_root_motion(
                &skeleton,
                Vec3::new(0.2 * (0.8 * t).sin(), 0.0, 1.2 * t),
                Vec3::new(0.0, 0.9 + 0.03 * (2.0 * phase).sin(), 0.0),
                rotations,
            )
            .with_contacts(stance, !stance)
        })
        .collect();

    let mut builder = PoseSetBuilder::new(skeleton, FRAME_TIME);
    builder
        .add_clip(MotionClip {
            name: "walk".into(),
            frames: clip_frames,
        })
        .unwrap();
    builder.build().unwrap()
}

/// Head trajectory at 20, 40 and 60 frames plus toes and hips.
pub fn feature_descriptors() -> Vec<FeatureDescriptor> {
    let descriptor = |name: &str, kind, joint: &str, prediction_frames: Vec<usize>| {
        FeatureDescriptor {
            name: name.into(),
            kind,
            joint: joint.into(),
            prediction_frames,
            ..Default::default()
        }
    };
    vec![
        descriptor("trajectory", FeatureKind::TrajectoryPosition, "Head", vec![20, 40, 60]),
        descriptor("direction", FeatureKind::TrajectoryDirection, "Head", vec![20, 40, 60]),
        descriptor("left_toes", FeatureKind::JointPosition, LEFT_TOES, vec![]),
        descriptor("right_toes", FeatureKind::JointPosition, RIGHT_TOES, vec![]),
        descriptor("hips_velocity", FeatureKind::JointVelocity, "Hips", vec![]),
    ]
}

pub fn feature_set_for(poses: &PoseSet) -> FeatureSet {
    let layout = FeatureLayout::new(&feature_descriptors(), poses.skeleton()).unwrap();
    FeatureSet::extract(poses, layout).unwrap()
}

pub fn walk_feature_set(frames: usize) -> FeatureSet {
    feature_set_for(&walk_pose_set(frames))
}

pub fn walk_database(frames: usize) -> MotionDatabase {
    MotionDatabase::build(walk_pose_set(frames), &feature_descriptors()).unwrap()
}

/// Features already in normalized units (zero mean, unit deviation).
fn normalized_set(rows: &[Vec<f32>]) -> FeatureSet {
    let layout = FeatureLayout::new(&feature_descriptors(), &biped_skeleton()).unwrap();
    let size = layout.size();
    let stats = FeatureStats {
        mean: vec![0.0; size],
        std: vec![1.0; size],
    };
    let features = rows.iter().flat_map(|row| row.iter().copied()).collect();
    FeatureSet::from_normalized(layout, stats, features, vec![true; rows.len()]).unwrap()
}

/// 64 frames where every odd frame holds the same vector.
pub fn duplicated_feature_set() -> FeatureSet {
    let size = FeatureLayout::new(&feature_descriptors(), &biped_skeleton())
        .unwrap()
        .size();
    let rows: Vec<Vec<f32>> = (0..64)
        .map(|frame| {
            let value = if frame % 2 == 1 { 1.0 } else { frame as f32 };
            vec![value; size]
        })
        .collect();
    normalized_set(&rows)
}

/// Four frames around a zero query:
/// 0 is off by 0.1 on every trajectory dimension and exact on the pose,
/// 1 is far on the trajectory,
/// 2 is exact on the trajectory and off by 0.15 on every pose dimension,
/// 3 is far everywhere.
pub fn four_frame_feature_set() -> FeatureSet {
    let layout = FeatureLayout::new(&feature_descriptors(), &biped_skeleton()).unwrap();
    let (size, pose_offset) = (layout.size(), layout.pose_offset());
    let row = |trajectory: f32, pose: f32| {
        let mut row = vec![pose; size];
        row[..pose_offset].fill(trajectory);
        row
    };
    normalized_set(&[
        row(0.1, 0.0),
        row(1.0, 0.0),
        row(0.0, 0.15),
        row(2.0, 2.0),
    ])
}

pub fn tracker_frame(head_position: Vec3, head_rotation: Quat) -> TrackerFrame {
    let hand = |x: f32| {
        Transform::from_translation(head_position + head_rotation * Vec3::new(x, -0.5, 0.3))
            .with_rotation(head_rotation)
    };
    TrackerFrame {
        head: Transform::from_translation(head_position).with_rotation(head_rotation),
        left_hand: hand(0.25),
        right_hand: hand(-0.25),
    }
}

/// Standing height head moving at a constant `velocity`, facing where it
/// goes, starting at the origin.
pub fn tracker_walk(frames: usize, velocity: Vec3) -> Vec<TrackerFrame> {
    let rotation = yaw_from_direction(velocity);
    (0..frames)
        .map(|frame| {
            let position = Vec3::new(0.0, 1.6, 0.0) + velocity * (frame as f32 * FRAME_TIME);
            tracker_frame(position, rotation)
        })
        .collect()
}

pub fn left_leg() -> LegJointNames {
    MotionMatchingConfig::default().left_leg
}

pub fn right_leg() -> LegJointNames {
    MotionMatchingConfig::default().right_leg
}

pub fn config() -> MotionMatchingConfig {
    MotionMatchingConfig {
        features: feature_descriptors(),
        ..Default::default()
    }
}
