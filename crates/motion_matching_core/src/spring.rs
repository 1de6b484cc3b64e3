//! Closed-form critically damped springs, parameterized by half-life.
//!
//! All updates are the exact (implicit) solution of the spring ODE over `dt`,
//! so they stay stable for arbitrarily large time steps and never overshoot.
//! See <https://theorangeduck.com/page/spring-roll-call>.

use crate::math::{from_scaled_angle_axis, to_scaled_angle_axis};
use bevy::{
    math::{Quat, Vec3},
    reflect::Reflect,
};
use std::f32::consts::LN_2;

const HALFLIFE_EPSILON: f32 = 1e-5;

/// Offsets below this magnitude (and with a velocity below it) are snapped to
/// zero so decays terminate.
pub const DECAY_SNAP_EPSILON: f32 = 1e-6;

pub fn halflife_to_damping(halflife: f32) -> f32 {
    (4.0 * LN_2) / (halflife + HALFLIFE_EPSILON)
}

pub fn damping_to_halflife(damping: f32) -> f32 {
    (4.0 * LN_2) / (damping + HALFLIFE_EPSILON)
}

fn negexp(x: f32) -> f32 {
    (-x).exp()
}

/// Moves `x` towards `x_goal`.
pub fn simple_spring_damper_implicit(
    x: &mut Vec3,
    v: &mut Vec3,
    x_goal: Vec3,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = *x - x_goal;
    let j1 = *v + j0 * y;
    let eydt = negexp(y * dt);

    *x = eydt * (j0 + j1 * dt) + x_goal;
    *v = eydt * (*v - j1 * y * dt);
}

/// Rotational version of [`simple_spring_damper_implicit`]; `v` is an angular
/// velocity in scaled angle-axis form.
pub fn simple_spring_damper_implicit_quat(
    x: &mut Quat,
    v: &mut Vec3,
    x_goal: Quat,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = to_scaled_angle_axis(*x * x_goal.inverse());
    let j1 = *v + j0 * y;
    let eydt = negexp(y * dt);

    *x = (from_scaled_angle_axis(eydt * (j0 + j1 * dt)) * x_goal).normalize();
    *v = eydt * (*v - j1 * y * dt);
}

/// Part of the offset velocity `v` that brings `x` straight back to zero, no
/// faster than damping `y` allows. With it the decay neither grows nor
/// crosses zero, whatever velocity the offset was seeded with.
fn settling_velocity(x: Vec3, v: Vec3, y: f32) -> Vec3 {
    let length = x.length();
    if length <= 0.0 {
        return Vec3::ZERO;
    }
    let direction = x / length;
    let speed = (-v.dot(direction)).clamp(0.0, y * length);
    -direction * speed
}

/// Decays an offset towards zero. `|x|` strictly decreases every step with
/// `dt > 0` and is snapped to zero once negligible.
pub fn decay_spring_damper_implicit(x: &mut Vec3, v: &mut Vec3, halflife: f32, dt: f32) {
    let y = halflife_to_damping(halflife) / 2.0;
    *v = settling_velocity(*x, *v, y);
    let j1 = *v + *x * y;
    let eydt = negexp(y * dt);

    *x = eydt * (*x + j1 * dt);
    *v = eydt * (*v - j1 * y * dt);

    if x.length() < DECAY_SNAP_EPSILON && v.length() < DECAY_SNAP_EPSILON {
        *x = Vec3::ZERO;
        *v = Vec3::ZERO;
    }
}

/// Decays a rotation offset towards the identity.
pub fn decay_spring_damper_implicit_quat(x: &mut Quat, v: &mut Vec3, halflife: f32, dt: f32) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = to_scaled_angle_axis(*x);
    *v = settling_velocity(j0, *v, y);
    let j1 = *v + j0 * y;
    let eydt = negexp(y * dt);

    let offset = eydt * (j0 + j1 * dt);
    *v = eydt * (*v - j1 * y * dt);

    if offset.length() < DECAY_SNAP_EPSILON && v.length() < DECAY_SNAP_EPSILON {
        *x = Quat::IDENTITY;
        *v = Vec3::ZERO;
    } else {
        *x = from_scaled_angle_axis(offset);
    }
}

/// Advances a character position whose velocity is driven towards `v_goal`
/// with a smoothly varying acceleration.
pub fn character_position_update(
    x: &mut Vec3,
    v: &mut Vec3,
    a: &mut Vec3,
    v_goal: Vec3,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_damping(halflife) / 2.0;
    let j0 = *v - v_goal;
    let j1 = *a + j0 * y;
    let eydt = negexp(y * dt);

    *x = eydt * ((-j1 / (y * y)) + ((-j0 - j1 * dt) / y))
        + (j1 / (y * y))
        + j0 / y
        + v_goal * dt
        + *x;
    *v = eydt * (j0 + j1 * dt) + v_goal;
    *a = eydt * (*a - j1 * y * dt);
}

/// Portion of `goal` to apply this step so that the remaining gap halves every
/// `halflife` seconds.
pub fn damp_adjustment_implicit(goal: Vec3, halflife: f32, dt: f32) -> Vec3 {
    goal * (1.0 - negexp((LN_2 * dt) / (halflife + HALFLIFE_EPSILON)))
}

pub fn damp_adjustment_implicit_quat(goal: Quat, halflife: f32, dt: f32) -> Quat {
    Quat::IDENTITY.slerp(
        goal,
        1.0 - negexp((LN_2 * dt) / (halflife + HALFLIFE_EPSILON)),
    )
}

/// Damped rotation state: a simulated rotation catching up with a desired one.
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
pub struct RotationSpring {
    pub rotation: Quat,
    pub angular_velocity: Vec3,
}

impl Default for RotationSpring {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
        }
    }
}

impl RotationSpring {
    pub fn new(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Default::default()
        }
    }

    pub fn update(&mut self, goal: Quat, halflife: f32, dt: f32) {
        simple_spring_damper_implicit_quat(
            &mut self.rotation,
            &mut self.angular_velocity,
            goal,
            halflife,
            dt,
        );
    }
}

/// Damped position state: velocity catches up with a desired velocity through
/// a decaying acceleration.
#[derive(Reflect, Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionSpring {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
}

impl PositionSpring {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn update(&mut self, desired_velocity: Vec3, halflife: f32, dt: f32) {
        character_position_update(
            &mut self.position,
            &mut self.velocity,
            &mut self.acceleration,
            desired_velocity,
            halflife,
            dt,
        );
    }
}
