//! Facing prediction from the three trackers.
//!
//! The model itself is external; [`DirectionPredictor`] only prepares its
//! input, feeds its previous output back and keeps the result sane.

use crate::{
    errors::ConfigError,
    math::{
        angular_velocity, array_to_continuous, continuous_to_array, quat_from_continuous,
        quat_to_continuous, yaw_from_direction, yaw_only, FORWARD,
    },
    trajectory::TrackerFrame,
};
use bevy::{
    log::warn,
    math::{Quat, Vec3},
    reflect::Reflect,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc};

pub const TRACKER_COUNT: usize = 3;
/// Continuous rotation, velocity and angular velocity.
pub const FEATURES_PER_TRACKER: usize = 12;
pub const TRACKER_FEATURES: usize = TRACKER_COUNT * FEATURES_PER_TRACKER;
pub const ROTATION_FEATURES: usize = 6;
pub const MODEL_INPUT_SIZE: usize = TRACKER_FEATURES + ROTATION_FEATURES;

/// Outputs beyond this magnitude are treated as divergence.
pub const DIVERGENCE_LIMIT: f32 = 1000.0;

/// Velocity samples averaged per tracker.
pub const VELOCITY_WINDOW: usize = 5;

/// Black-box facing regressor: normalized tracker features followed by its
/// own previous (normalized) output, to the next normalized continuous
/// rotation.
pub trait DirectionModel: Send + Sync {
    fn input_size(&self) -> usize;
    fn predict(&self, input: &[f32], output: &mut [f32; ROTATION_FEATURES]);
}

/// Normalization the model was trained with.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DirectionNormalization {
    pub tracker_mean: Vec<f32>,
    pub tracker_std: Vec<f32>,
    pub rotation_mean: [f32; ROTATION_FEATURES],
    pub rotation_std: [f32; ROTATION_FEATURES],
}

impl Default for DirectionNormalization {
    fn default() -> Self {
        Self {
            tracker_mean: vec![0.0; TRACKER_FEATURES],
            tracker_std: vec![1.0; TRACKER_FEATURES],
            rotation_mean: [0.0; ROTATION_FEATURES],
            rotation_std: [1.0; ROTATION_FEATURES],
        }
    }
}

/// Rotations mapping each device's reported orientation to the orientation
/// the model was trained on: `device * local_to_vr⁻¹ * vr_to_tracker`.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TrackerCalibration {
    pub local_to_vr: [Quat; TRACKER_COUNT],
    pub vr_to_tracker: [Quat; TRACKER_COUNT],
}

impl Default for TrackerCalibration {
    fn default() -> Self {
        Self {
            local_to_vr: [Quat::IDENTITY; TRACKER_COUNT],
            vr_to_tracker: [Quat::IDENTITY; TRACKER_COUNT],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct TrackerHistory {
    previous_position: Vec3,
    previous_rotation: Quat,
    velocities: [Vec3; VELOCITY_WINDOW],
    angular_velocities: [Vec3; VELOCITY_WINDOW],
    next: usize,
}

impl TrackerHistory {
    fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            previous_position: position,
            previous_rotation: rotation,
            velocities: [Vec3::ZERO; VELOCITY_WINDOW],
            angular_velocities: [Vec3::ZERO; VELOCITY_WINDOW],
            next: 0,
        }
    }

    /// Smoothed linear and angular velocity after recording a new sample.
    fn push(&mut self, position: Vec3, rotation: Quat, dt: f32) -> (Vec3, Vec3) {
        self.velocities[self.next] = (position - self.previous_position) / dt;
        self.angular_velocities[self.next] = angular_velocity(self.previous_rotation, rotation, dt);
        self.next = (self.next + 1) % VELOCITY_WINDOW;
        self.previous_position = position;
        self.previous_rotation = rotation;
        let n = VELOCITY_WINDOW as f32;
        (
            self.velocities.iter().copied().sum::<Vec3>() / n,
            self.angular_velocities.iter().copied().sum::<Vec3>() / n,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionUpdate {
    /// Yaw-only facing.
    pub rotation: Quat,
    /// The model diverged and was reset to the identity this tick.
    pub reset: bool,
}

#[derive(Clone)]
pub struct DirectionPredictor {
    model: Arc<dyn DirectionModel>,
    normalization: DirectionNormalization,
    calibration: TrackerCalibration,
    sample_rate: f32,
    history: [TrackerHistory; TRACKER_COUNT],
    input: Vec<f32>,
    /// Denormalized continuous rotation, relative to the head's yaw.
    predicted: [f32; ROTATION_FEATURES],
    rotation: Quat,
}

impl DirectionPredictor {
    pub fn new(
        model: Arc<dyn DirectionModel>,
        normalization: DirectionNormalization,
        calibration: TrackerCalibration,
        sample_rate: f32,
        trackers: &TrackerFrame,
    ) -> Result<Self, ConfigError> {
        if model.input_size() != MODEL_INPUT_SIZE {
            return Err(ConfigError::DirectionInputMismatch {
                expected: MODEL_INPUT_SIZE,
                found: model.input_size(),
            });
        }
        for (name, found) in [
            ("tracker_mean", normalization.tracker_mean.len()),
            ("tracker_std", normalization.tracker_std.len()),
        ] {
            if found != TRACKER_FEATURES {
                return Err(ConfigError::InvalidParameter {
                    name: format!("direction.{name}"),
                    reason: format!("expected {TRACKER_FEATURES} values, found {found}"),
                });
            }
        }
        if !(sample_rate > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "direction.sample_rate".into(),
                reason: format!("must be positive, got {sample_rate}"),
            });
        }

        let history = trackers
            .trackers()
            .map(|tracker| TrackerHistory::new(tracker.translation, tracker.rotation));
        Ok(Self {
            model,
            normalization,
            calibration,
            sample_rate,
            history,
            input: vec![0.0; MODEL_INPUT_SIZE],
            predicted: identity_continuous(),
            rotation: yaw_only(trackers.head.rotation),
        })
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Runs the model once for this tick's trackers.
    pub fn update(&mut self, trackers: &TrackerFrame) -> DirectionUpdate {
        let dt = 1.0 / self.sample_rate;
        let devices = trackers.trackers();

        let head_rotation = self.calibrated(0, devices[0].rotation);
        let projected_head = yaw_from_direction(head_rotation * FORWARD);
        let to_head_space = projected_head.inverse();

        for (index, device) in devices.iter().enumerate() {
            let rotation = to_head_space * self.calibrated(index, device.rotation);
            let (velocity, angular) =
                self.history[index].push(device.translation, device.rotation, dt);
            let features = &mut self.input
                [index * FEATURES_PER_TRACKER..(index + 1) * FEATURES_PER_TRACKER];
            features[..6].copy_from_slice(&continuous_to_array(quat_to_continuous(rotation)));
            features[6..9].copy_from_slice(&(to_head_space * velocity).to_array());
            features[9..12].copy_from_slice(&(to_head_space * angular).to_array());
        }
        for ((value, mean), std) in self.input[..TRACKER_FEATURES]
            .iter_mut()
            .zip(&self.normalization.tracker_mean)
            .zip(&self.normalization.tracker_std)
        {
            *value = (*value - mean) / std;
        }
        for (i, value) in self.predicted.iter().enumerate() {
            self.input[TRACKER_FEATURES + i] = (value - self.normalization.rotation_mean[i])
                / self.normalization.rotation_std[i];
        }

        let mut output = [0.0; ROTATION_FEATURES];
        self.model.predict(&self.input, &mut output);
        for (i, value) in output.iter_mut().enumerate() {
            *value = *value * self.normalization.rotation_std[i] + self.normalization.rotation_mean[i];
        }

        let reset = output
            .iter()
            .any(|value| !value.is_finite() || value.abs() > DIVERGENCE_LIMIT);
        if reset {
            warn!("Direction model diverged with output {output:?}, resetting to identity");
            output = identity_continuous();
        }
        self.predicted = output;

        let [c0, c1] = array_to_continuous(&self.predicted);
        self.rotation = yaw_only(projected_head * quat_from_continuous(c0, c1));
        DirectionUpdate {
            rotation: self.rotation,
            reset,
        }
    }

    fn calibrated(&self, index: usize, rotation: Quat) -> Quat {
        rotation * self.calibration.local_to_vr[index].inverse() * self.calibration.vr_to_tracker[index]
    }
}

impl Debug for DirectionPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionPredictor")
            .field("sample_rate", &self.sample_rate)
            .field("predicted", &self.predicted)
            .field("rotation", &self.rotation)
            .finish_non_exhaustive()
    }
}

fn identity_continuous() -> [f32; ROTATION_FEATURES] {
    continuous_to_array(quat_to_continuous(Quat::IDENTITY))
}
