mod adjustment;
mod source;

pub use adjustment::*;
pub use source::*;

use crate::{
    math::{FORWARD, project_on_ground},
    spring::{PositionSpring, RotationSpring},
};
use bevy::{
    math::{Quat, Vec3},
    reflect::Reflect,
};
use serde::{Deserialize, Serialize};

/// How eagerly the simulated character follows its input.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PredictionTuning {
    /// 0 ignores position input, 1 follows it instantly.
    pub responsiveness_positions: f32,
    pub responsiveness_directions: f32,
    /// Growth of the smoothed speed (m/s) that triggers an immediate search.
    pub quick_change_threshold: f32,
    /// Frame rate the predictions and raw velocities assume.
    pub average_fps: f32,
    /// Raw velocity samples averaged by the smoother.
    pub velocity_window: usize,
}

impl Default for PredictionTuning {
    fn default() -> Self {
        Self {
            responsiveness_positions: 0.75,
            responsiveness_directions: 0.75,
            quick_change_threshold: 0.1,
            average_fps: 60.0,
            velocity_window: 1,
        }
    }
}

impl PredictionTuning {
    pub fn position_halflife(&self) -> f32 {
        1.0 - self.responsiveness_positions
    }

    pub fn direction_halflife(&self) -> f32 {
        1.0 - self.responsiveness_directions
    }

    pub fn averaged_delta_time(&self) -> f32 {
        1.0 / self.average_fps
    }
}

/// Averages finite-difference velocities over a fixed ring buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct VelocitySmoother {
    samples: Vec<Vec3>,
    next: usize,
    previous_position: Vec3,
}

impl VelocitySmoother {
    pub fn new(window: usize, position: Vec3) -> Self {
        Self {
            samples: vec![Vec3::ZERO; window.max(1)],
            next: 0,
            previous_position: position,
        }
    }

    /// Records `position` and returns the averaged velocity.
    pub fn push(&mut self, position: Vec3, dt: f32) -> Vec3 {
        let velocity = if dt > 0.0 {
            (position - self.previous_position) / dt
        } else {
            Vec3::ZERO
        };
        self.previous_position = position;
        self.samples[self.next] = velocity;
        self.next = (self.next + 1) % self.samples.len();
        self.average()
    }

    pub fn average(&self) -> Vec3 {
        self.samples.iter().copied().sum::<Vec3>() / self.samples.len() as f32
    }
}

/// One predicted point of the future trajectory, in world space.
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
pub struct TrajectorySample {
    pub position: Vec3,
    /// Ground-plane facing, unit length.
    pub direction: Vec3,
}

/// Damped character state plus its prediction at fixed future frames.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryPredictor {
    prediction_frames: Vec<usize>,
    rotation: RotationSpring,
    position: PositionSpring,
    predicted: Vec<TrajectorySample>,
    previous_speed_sq: f32,
}

impl TrajectoryPredictor {
    pub fn new(prediction_frames: Vec<usize>, position: Vec3, rotation: Quat) -> Self {
        let sample = TrajectorySample {
            position,
            direction: facing(rotation),
        };
        Self {
            predicted: vec![sample; prediction_frames.len()],
            prediction_frames,
            rotation: RotationSpring::new(rotation),
            position: PositionSpring::new(position),
            previous_speed_sq: 0.0,
        }
    }

    pub fn prediction_frames(&self) -> &[usize] {
        &self.prediction_frames
    }

    pub fn predictions(&self) -> &[TrajectorySample] {
        &self.predicted
    }

    pub fn rotation(&self) -> Quat {
        self.rotation.rotation
    }

    pub fn position(&self) -> Vec3 {
        self.position.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.position.velocity
    }

    /// True when the squared desired speed grew by more than the squared
    /// threshold since the previous call.
    pub fn detect_quick_change(&mut self, desired_velocity: Vec3, threshold: f32) -> bool {
        let speed_sq = desired_velocity.length_squared();
        let quick = speed_sq - self.previous_speed_sq > threshold * threshold;
        self.previous_speed_sq = speed_sq;
        quick
    }

    /// Predicts from the current state, each sample continuing from the
    /// previous one over the frames between them.
    pub fn predict(&mut self, desired_velocity: Vec3, desired_rotation: Quat, tuning: &PredictionTuning) {
        let frame_dt = tuning.averaged_delta_time();
        let mut position = self.position;
        let mut rotation = self.rotation;
        let mut last_frame = 0;
        for (sample, &frame) in self.predicted.iter_mut().zip(&self.prediction_frames) {
            let dt = frame.saturating_sub(last_frame) as f32 * frame_dt;
            last_frame = frame;
            position.update(desired_velocity, tuning.position_halflife(), dt);
            rotation.update(desired_rotation, tuning.direction_halflife(), dt);
            *sample = TrajectorySample {
                position: position.position,
                direction: facing(rotation.rotation),
            };
        }
    }

    /// Advances the current state by the real tick `dt`.
    pub fn advance(
        &mut self,
        desired_velocity: Vec3,
        desired_rotation: Quat,
        tuning: &PredictionTuning,
        dt: f32,
    ) {
        self.position
            .update(desired_velocity, tuning.position_halflife(), dt);
        self.rotation
            .update(desired_rotation, tuning.direction_halflife(), dt);
    }

    /// Pins the current position to a measured one, keeping the damped
    /// velocity and acceleration.
    pub fn set_position(&mut self, position: Vec3) {
        self.position.position = position;
    }
}

/// Ground-projected forward of `rotation`.
pub fn facing(rotation: Quat) -> Vec3 {
    project_on_ground(rotation * FORWARD).normalize_or(FORWARD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoother_averages_window() {
        let mut smoother = VelocitySmoother::new(2, Vec3::ZERO);
        assert!(smoother.push(Vec3::X, 1.0).abs_diff_eq(Vec3::X * 0.5, 1e-6));
        assert!(smoother.push(Vec3::X * 3.0, 1.0).abs_diff_eq(Vec3::X * 1.5, 1e-6));
    }

    #[test]
    fn predictions_move_along_desired_velocity() {
        let tuning = PredictionTuning::default();
        let mut predictor = TrajectoryPredictor::new(vec![20, 40, 60], Vec3::ZERO, Quat::IDENTITY);
        predictor.predict(Vec3::X, Quat::IDENTITY, &tuning);
        let samples = predictor.predictions();
        assert!(samples[0].position.x > 0.0);
        assert!(samples[1].position.x > samples[0].position.x);
        assert!(samples[2].position.x > samples[1].position.x);
        // Never faster than the desired velocity over one second.
        assert!(samples[2].position.x < 1.0);
    }

    #[test]
    fn composed_prediction_matches_one_long_step() {
        let tuning = PredictionTuning::default();
        let mut predictor = TrajectoryPredictor::new(vec![20, 40, 60], Vec3::ZERO, Quat::IDENTITY);
        let desired_rotation = Quat::from_rotation_y(1.0);
        predictor.predict(Vec3::Z, desired_rotation, &tuning);

        let mut position = PositionSpring::default();
        position.update(Vec3::Z, tuning.position_halflife(), 1.0);
        let mut rotation = RotationSpring::default();
        rotation.update(desired_rotation, tuning.direction_halflife(), 1.0);

        let last = predictor.predictions()[2];
        assert!(last.position.abs_diff_eq(position.position, 1e-4));
        assert!(last.direction.abs_diff_eq(facing(rotation.rotation), 1e-4));
    }

    #[test]
    fn quick_change_only_on_speed_increase() {
        let mut predictor = TrajectoryPredictor::new(vec![20], Vec3::ZERO, Quat::IDENTITY);
        assert!(!predictor.detect_quick_change(Vec3::ZERO, 0.1));
        assert!(predictor.detect_quick_change(Vec3::X, 0.1));
        assert!(!predictor.detect_quick_change(Vec3::X * 1.001, 0.1));
        assert!(!predictor.detect_quick_change(Vec3::ZERO, 0.1));
    }

    #[test]
    fn facing_ignores_pitch() {
        let rotation = Quat::from_rotation_y(0.5) * Quat::from_rotation_x(0.4);
        let direction = facing(rotation);
        assert!(direction.y.abs() < 1e-6);
        assert!((direction.length() - 1.0).abs() < 1e-5);
        assert!(direction.abs_diff_eq(Quat::from_rotation_y(0.5) * FORWARD, 1e-5));
    }
}
