//! Small rotation helpers shared by the springs, the feature extraction and the
//! direction predictor.

use bevy::math::{Mat3, Quat, Vec3};

/// Local forward axis of every dataset: the simulation bone looks down `+Z`.
pub const FORWARD: Vec3 = Vec3::Z;

/// Returns the quaternion of the pair `{q, -q}` with non-negative `w`, so that
/// offsets always take the short way around.
pub fn quat_abs(q: Quat) -> Quat {
    if q.w < 0.0 { -q } else { q }
}

/// Rotation as axis scaled by angle (radians), shortest arc.
pub fn to_scaled_angle_axis(q: Quat) -> Vec3 {
    quat_abs(q).to_scaled_axis()
}

pub fn from_scaled_angle_axis(v: Vec3) -> Quat {
    Quat::from_scaled_axis(v)
}

/// World-space angular velocity that takes `from` to `to` in `dt` seconds.
pub fn angular_velocity(from: Quat, to: Quat, dt: f32) -> Vec3 {
    if dt <= 0.0 {
        return Vec3::ZERO;
    }
    to_scaled_angle_axis(to * from.inverse()) / dt
}

/// Drops the vertical component of a vector.
pub fn project_on_ground(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Rotation about `+Y` that turns [`FORWARD`] into the ground projection of
/// `direction`. Vertical or zero directions map to the identity.
pub fn yaw_from_direction(direction: Vec3) -> Quat {
    let flat = project_on_ground(direction);
    if flat.length_squared() < 1e-12 {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_y(flat.x.atan2(flat.z))
}

/// Keeps only the rotation about the vertical axis.
pub fn yaw_only(q: Quat) -> Quat {
    yaw_from_direction(q * FORWARD)
}

/// Continuous 6D encoding of a rotation: the first two columns of its matrix.
pub fn quat_to_continuous(q: Quat) -> [Vec3; 2] {
    let m = Mat3::from_quat(q);
    [m.x_axis, m.y_axis]
}

/// Inverse of [`quat_to_continuous`], re-orthonormalizing with Gram-Schmidt.
/// Degenerate inputs give the identity.
pub fn quat_from_continuous(c0: Vec3, c1: Vec3) -> Quat {
    let Some(x) = c0.try_normalize() else {
        return Quat::IDENTITY;
    };
    let Some(y) = (c1 - x * x.dot(c1)).try_normalize() else {
        return Quat::IDENTITY;
    };
    let z = x.cross(y);
    Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
}

pub fn continuous_to_array(columns: [Vec3; 2]) -> [f32; 6] {
    let [c0, c1] = columns;
    [c0.x, c0.y, c0.z, c1.x, c1.y, c1.z]
}

pub fn array_to_continuous(values: &[f32; 6]) -> [Vec3; 2] {
    [
        Vec3::new(values[0], values[1], values[2]),
        Vec3::new(values[3], values[4], values[5]),
    ]
}
