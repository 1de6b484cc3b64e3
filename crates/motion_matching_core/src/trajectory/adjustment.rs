//! Keeps the animated simulation bone close to the tracked character.
//!
//! The adjustment pulls the bone a damped fraction of the way towards the
//! simulation object each tick, limited by how fast the animation already
//! moves so the correction hides inside real motion. Clamping then enforces
//! a hard maximum distance on the ground plane.

use crate::{
    math::{FORWARD, from_scaled_angle_axis, project_on_ground, to_scaled_angle_axis, yaw_from_direction},
    spring::{damp_adjustment_implicit, damp_adjustment_implicit_quat},
};
use bevy::{
    math::{Quat, Vec3},
    reflect::Reflect,
};
use serde::{Deserialize, Serialize};

#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AdjustmentConfig {
    pub adjust: bool,
    pub position_halflife: f32,
    pub rotation_halflife: f32,
    /// Largest correction as a fraction of the bone's own speed.
    pub max_position_ratio: f32,
    pub max_rotation_ratio: f32,
    pub clamp: bool,
    pub max_distance: f32,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            adjust: true,
            position_halflife: 0.1,
            rotation_halflife: 0.1,
            max_position_ratio: 0.1,
            max_rotation_ratio: 0.1,
            clamp: true,
            max_distance: 0.1,
        }
    }
}

/// Ground-plane translation to add to the bone this tick.
pub fn position_adjustment(
    bone: Vec3,
    object: Vec3,
    bone_velocity: Vec3,
    config: &AdjustmentConfig,
    dt: f32,
) -> Vec3 {
    let difference = project_on_ground(object - bone);
    let adjustment = damp_adjustment_implicit(difference, config.position_halflife, dt);
    let max_length = config.max_position_ratio * bone_velocity.length() * dt;
    adjustment.clamp_length_max(max_length)
}

/// Yaw to apply to the bone this tick.
pub fn rotation_adjustment(
    bone: Quat,
    object: Quat,
    bone_angular_velocity: Vec3,
    config: &AdjustmentConfig,
    dt: f32,
) -> Quat {
    let difference =
        yaw_from_direction(object * FORWARD) * yaw_from_direction(bone * FORWARD).inverse();
    let adjustment = damp_adjustment_implicit_quat(difference, config.rotation_halflife, dt);
    let max_angle = config.max_rotation_ratio * bone_angular_velocity.length() * dt;
    from_scaled_angle_axis(to_scaled_angle_axis(adjustment).clamp_length_max(max_angle))
}

/// Translation that brings the bone back within `max_distance` of the
/// object on the ground plane, if it strayed further.
pub fn clamp_adjustment(bone: Vec3, object: Vec3, max_distance: f32) -> Option<Vec3> {
    let bone = project_on_ground(bone);
    let object = project_on_ground(object);
    let offset = bone - object;
    if offset.length() <= max_distance {
        return None;
    }
    Some(object + offset.normalize_or_zero() * max_distance - bone)
}
