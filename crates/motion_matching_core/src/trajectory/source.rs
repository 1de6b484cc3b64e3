use super::{PredictionTuning, TrajectoryPredictor, TrajectorySample, VelocitySmoother};
use crate::{
    direction::DirectionPredictor,
    math::{project_on_ground, yaw_only},
};
use bevy::{
    math::{Quat, Vec3},
    reflect::Reflect,
    transform::components::Transform,
};

/// World-space poses of the head-mounted display and both hand controllers
/// for one tick.
#[derive(Reflect, Clone, Copy, Debug, PartialEq)]
pub struct TrackerFrame {
    pub head: Transform,
    pub left_hand: Transform,
    pub right_hand: Transform,
}

impl TrackerFrame {
    pub fn trackers(&self) -> [Transform; 3] {
        [self.head, self.left_hand, self.right_hand]
    }
}

/// What an input update noticed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputUpdate {
    pub quick_change: bool,
    pub direction_reset: bool,
}

/// Where a character's future trajectory comes from.
pub enum CharacterInput {
    /// Driven by a VR rig: the head position sets the velocity, the facing
    /// comes from the head or from a direction predictor.
    Tracked(TrackedInput),
    /// Driven by code: a desired planar velocity and facing.
    Directed(DirectedInput),
}

impl CharacterInput {
    pub fn update(&mut self, trackers: Option<&TrackerFrame>, dt: f32) -> InputUpdate {
        match self {
            CharacterInput::Tracked(input) => match trackers {
                Some(trackers) => input.update(trackers, dt),
                None => InputUpdate::default(),
            },
            CharacterInput::Directed(input) => input.update(dt),
        }
    }

    /// World-space samples at the predictor's future frames.
    pub fn predictions(&self) -> &[TrajectorySample] {
        self.predictor().predictions()
    }

    pub fn predictor(&self) -> &TrajectoryPredictor {
        match self {
            CharacterInput::Tracked(input) => &input.predictor,
            CharacterInput::Directed(input) => &input.predictor,
        }
    }

    pub fn tuning(&self) -> &PredictionTuning {
        match self {
            CharacterInput::Tracked(input) => &input.tuning,
            CharacterInput::Directed(input) => &input.tuning,
        }
    }

    /// Where the character starts: ground position and yaw.
    pub fn initial_placement(&self) -> Transform {
        match self {
            CharacterInput::Tracked(input) => input.initial,
            CharacterInput::Directed(input) => input.initial,
        }
    }

    /// Ground transform the simulation bone is pulled towards.
    pub fn simulation_object(&self) -> Transform {
        match self {
            CharacterInput::Tracked(input) => Transform {
                translation: project_on_ground(input.head.translation),
                rotation: input.desired_rotation,
                ..Transform::IDENTITY
            },
            CharacterInput::Directed(input) => Transform {
                translation: project_on_ground(input.predictor.position()),
                rotation: yaw_only(input.predictor.rotation()),
                ..Transform::IDENTITY
            },
        }
    }

    /// Current head height, for inputs that track a head.
    pub fn head_height(&self) -> Option<f32> {
        match self {
            CharacterInput::Tracked(input) => Some(input.head.translation.y),
            CharacterInput::Directed(_) => None,
        }
    }
}

pub struct TrackedInput {
    predictor: TrajectoryPredictor,
    smoother: VelocitySmoother,
    tuning: PredictionTuning,
    direction: Option<DirectionPredictor>,
    head: Transform,
    desired_rotation: Quat,
    initial: Transform,
}

impl TrackedInput {
    pub fn new(
        trackers: &TrackerFrame,
        prediction_frames: Vec<usize>,
        tuning: PredictionTuning,
        direction: Option<DirectionPredictor>,
    ) -> Self {
        let head = trackers.head;
        let rotation = yaw_only(head.rotation);
        let initial = Transform::from_translation(project_on_ground(head.translation))
            .with_rotation(rotation);
        Self {
            predictor: TrajectoryPredictor::new(prediction_frames, head.translation, rotation),
            smoother: VelocitySmoother::new(tuning.velocity_window, head.translation),
            tuning,
            direction,
            head,
            desired_rotation: rotation,
            initial,
        }
    }

    pub fn head(&self) -> Transform {
        self.head
    }

    pub fn direction_predictor(&self) -> Option<&DirectionPredictor> {
        self.direction.as_ref()
    }

    fn update(&mut self, trackers: &TrackerFrame, dt: f32) -> InputUpdate {
        self.head = trackers.head;
        let desired_velocity = self
            .smoother
            .push(self.head.translation, self.tuning.averaged_delta_time());
        let quick_change = self
            .predictor
            .detect_quick_change(desired_velocity, self.tuning.quick_change_threshold);

        let mut direction_reset = false;
        self.desired_rotation = match &mut self.direction {
            Some(direction) => {
                let update = direction.update(trackers);
                direction_reset = update.reset;
                update.rotation
            }
            None => yaw_only(self.head.rotation),
        };

        self.predictor.set_position(self.head.translation);
        self.predictor
            .predict(desired_velocity, self.desired_rotation, &self.tuning);
        self.predictor
            .advance(desired_velocity, self.desired_rotation, &self.tuning, dt);

        InputUpdate {
            quick_change,
            direction_reset,
        }
    }
}

pub struct DirectedInput {
    predictor: TrajectoryPredictor,
    tuning: PredictionTuning,
    desired_velocity: Vec3,
    desired_facing: Quat,
    initial: Transform,
}

impl DirectedInput {
    pub fn new(initial: Transform, prediction_frames: Vec<usize>, tuning: PredictionTuning) -> Self {
        let rotation = yaw_only(initial.rotation);
        let position = project_on_ground(initial.translation);
        Self {
            predictor: TrajectoryPredictor::new(prediction_frames, position, rotation),
            tuning,
            desired_velocity: Vec3::ZERO,
            desired_facing: rotation,
            initial: Transform::from_translation(position).with_rotation(rotation),
        }
    }

    /// Planar velocity to reach; the vertical component is dropped.
    pub fn set_desired_velocity(&mut self, velocity: Vec3) {
        self.desired_velocity = project_on_ground(velocity);
    }

    pub fn set_desired_facing(&mut self, facing: Quat) {
        self.desired_facing = yaw_only(facing);
    }

    pub fn desired_velocity(&self) -> Vec3 {
        self.desired_velocity
    }

    fn update(&mut self, dt: f32) -> InputUpdate {
        let quick_change = self
            .predictor
            .detect_quick_change(self.desired_velocity, self.tuning.quick_change_threshold);
        self.predictor
            .predict(self.desired_velocity, self.desired_facing, &self.tuning);
        self.predictor
            .advance(self.desired_velocity, self.desired_facing, &self.tuning, dt);
        InputUpdate {
            quick_change,
            direction_reset: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn tracked_walk_predicts_ahead() {
        let frames = testing::tracker_walk(120, Vec3::Z * 1.2);
        let mut input = CharacterInput::Tracked(TrackedInput::new(
            &frames[0],
            vec![20, 40, 60],
            PredictionTuning::default(),
            None,
        ));
        for frame in &frames[1..] {
            input.update(Some(frame), 1.0 / 60.0);
        }
        let head = frames[119].head.translation;
        let predictions = input.predictions();
        assert!(predictions[0].position.z > head.z);
        assert!(predictions[2].position.z > predictions[1].position.z);
        assert!(predictions[2].direction.abs_diff_eq(Vec3::Z, 1e-3));
    }

    #[test]
    fn tracked_start_raises_quick_change_once() {
        let mut frames = vec![testing::tracker_frame(Vec3::new(0.0, 1.6, 0.0), Quat::IDENTITY); 5];
        frames.extend(testing::tracker_walk(5, Vec3::X * 2.0));
        let mut input = CharacterInput::Tracked(TrackedInput::new(
            &frames[0],
            vec![20, 40, 60],
            PredictionTuning::default(),
            None,
        ));
        let quick: Vec<bool> = frames[1..]
            .iter()
            .map(|frame| input.update(Some(frame), 1.0 / 60.0).quick_change)
            .collect();
        assert_eq!(quick.iter().filter(|q| **q).count(), 1);
    }

    #[test]
    fn directed_input_walks_towards_desired_velocity() {
        let mut directed = DirectedInput::new(Transform::IDENTITY, vec![20, 40, 60], PredictionTuning::default());
        directed.set_desired_velocity(Vec3::new(1.0, 5.0, 0.0));
        directed.set_desired_facing(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let mut input = CharacterInput::Directed(directed);

        let first = input.update(None, 1.0 / 60.0);
        assert!(first.quick_change);
        for _ in 0..120 {
            input.update(None, 1.0 / 60.0);
        }
        let object = input.simulation_object();
        assert!(object.translation.x > 0.5);
        assert_eq!(object.translation.y, 0.0);
        assert!((object.rotation * Vec3::Z).abs_diff_eq(Vec3::X, 1e-2));
        assert_eq!(input.head_height(), None);
    }
}
