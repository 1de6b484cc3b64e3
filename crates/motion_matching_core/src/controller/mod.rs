//! The per-character control loop tying search, inertialization and foot
//! locking together.

mod query;
mod variants;

pub use query::*;
pub use variants::*;

use crate::{
    config::MotionMatchingConfig,
    database::MotionDatabase,
    direction::{DirectionModel, DirectionPredictor},
    errors::{ConfigError, FeatureSetError, MotionMatchingResult},
    foot_lock::{FootLockSolver, LockTransition},
    inertialization::Inertializer,
    math::angular_velocity,
    matching::{FeatureWeights, MotionMatcher},
    pose_set::{Foot, PoseVector},
    skeleton::{HIPS, SIMULATION_BONE, Skeleton, SkeletonPose},
    trajectory::{
        CharacterInput, DirectedInput, TrackedInput, TrackerFrame, TrajectorySample,
        clamp_adjustment, position_adjustment, rotation_adjustment,
    },
};
use bevy::{
    log::{info, warn},
    math::{Quat, Vec3},
    transform::components::Transform,
};
use std::sync::Arc;

/// Something that happened during a [`MotionMatchingController::step`], in
/// the order it happened.
#[derive(Clone, Debug, PartialEq)]
pub enum ControllerEvent {
    /// The desired speed jumped, a search was forced.
    InputChangedQuickly,
    /// The direction model diverged and was reset.
    DirectionReset,
    /// Head height selected another dataset variant (0 is the main one).
    SquatVariantChanged { from: usize, to: usize },
    Searched {
        frame: usize,
        distance: f32,
        /// The playing frame was kept.
        continued: bool,
    },
    /// Playback jumped from one database frame to another.
    Transitioned { from: usize, to: usize },
    FootLocked { foot: Foot, anchor: Vec3 },
    FootUnlocked { foot: Foot },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepOutput {
    /// Database frame shown this tick.
    pub frame: usize,
    /// World transform of every joint, simulation bone first.
    pub joints: Vec<Transform>,
    pub events: Vec<ControllerEvent>,
}

/// Maps database root motion to the world: the database root at the last
/// transition lands on the world root it had at that moment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchors {
    pub database_position: Vec3,
    pub inverse_database_rotation: Quat,
    pub world_position: Vec3,
    pub world_rotation: Quat,
}

impl Anchors {
    fn new(pose: &PoseVector, world: Transform) -> Self {
        Self {
            database_position: pose.local_positions[SIMULATION_BONE],
            inverse_database_rotation: pose.local_rotations[SIMULATION_BONE].inverse(),
            world_position: world.translation,
            world_rotation: world.rotation,
        }
    }

    /// World transform of a database root transform.
    pub fn to_world(&self, position: Vec3, rotation: Quat) -> Transform {
        let local_position = self.inverse_database_rotation * (position - self.database_position);
        let local_rotation = self.inverse_database_rotation * rotation;
        Transform {
            translation: self.world_rotation * local_position + self.world_position,
            rotation: (self.world_rotation * local_rotation).normalize(),
            ..Transform::IDENTITY
        }
    }
}

/// All mutable per-character state.
#[derive(Clone, Debug)]
pub struct ControllerState {
    /// Frame shown by the last tick.
    pub frame: usize,
    /// Playing dataset: 0 is the main one, `i + 1` the i-th squat variant.
    pub variant: usize,
    /// Ticks left until the next search.
    pub countdown: usize,
    pub anchors: Anchors,
    pub root: Transform,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    /// World-space pose shown by the last tick.
    pub pose: SkeletonPose,
    pub inertializer: Inertializer,
    pub foot_lock: FootLockSolver,
    pub calibrator: Calibrator,
    query: Vec<f32>,
}

pub struct MotionMatchingController {
    databases: Vec<MotionDatabase>,
    config: MotionMatchingConfig,
    matcher: MotionMatcher,
    input: CharacterInput,
    state: ControllerState,
}

impl MotionMatchingController {
    /// `variants` are the squat datasets, one per configured ratio. They must
    /// share the main dataset's skeleton and feature layout.
    pub fn new(
        database: MotionDatabase,
        variants: Vec<MotionDatabase>,
        config: MotionMatchingConfig,
        input: CharacterInput,
    ) -> MotionMatchingResult<Self> {
        config.validate()?;
        if variants.len() != config.squat.variant_ratios.len() {
            return Err(ConfigError::InvalidParameter {
                name: "squat.variant_ratios".into(),
                reason: format!(
                    "{} ratios for {} variant datasets",
                    config.squat.variant_ratios.len(),
                    variants.len()
                ),
            }
            .into());
        }

        let features = database.features().clone();
        let poses = database.poses().clone();
        let skeleton = poses.skeleton();
        for variant in &variants {
            if variant.poses().skeleton().len() != skeleton.len()
                || variant.features().layout() != features.layout()
            {
                return Err(ConfigError::InvalidParameter {
                    name: "variants".into(),
                    reason: "squat datasets must share the skeleton and feature layout".into(),
                }
                .into());
            }
        }

        let expected = input.predictor().prediction_frames().to_vec();
        let found = features.layout().trajectory_frames().to_vec();
        if expected != found {
            let feature = features
                .layout()
                .trajectory_features()
                .next()
                .map(|feature| feature.name.clone())
                .unwrap_or_default();
            return Err(ConfigError::PredictionFramesMismatch {
                feature,
                expected,
                found,
            }
            .into());
        }

        let legs = [
            config.left_leg.resolve(skeleton)?,
            config.right_leg.resolve(skeleton)?,
        ];
        let frame = features
            .first_valid_frame()
            .ok_or(FeatureSetError::NoValidFrames)?;
        let Some(pose) = poses.pose(frame) else {
            return Err(FeatureSetError::NoValidFrames.into());
        };

        let root = input.initial_placement();
        let anchors = Anchors::new(pose, root);
        let mut world_pose = SkeletonPose::default();
        write_locals(&mut world_pose, skeleton, pose, root, None);

        let matcher = MotionMatcher::new(FeatureWeights::new(
            features.layout(),
            config.responsiveness,
            config.quality,
        ))
        .with_parallel_threshold(config.parallel_threshold);

        info!(
            "Motion matching controller ready: {} frames, starting at frame {frame}",
            poses.len()
        );

        let state = ControllerState {
            frame,
            variant: 0,
            countdown: 0,
            anchors,
            root,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inertializer: Inertializer::new(pose),
            foot_lock: FootLockSolver::new(legs, config.foot_lock.clone(), &world_pose),
            pose: world_pose,
            calibrator: Calibrator::new(
                config.squat.default_eyes_height,
                config.squat.calibration_cooldown,
            ),
            query: Vec::with_capacity(features.feature_size()),
        };

        Ok(Self {
            databases: std::iter::once(database).chain(variants).collect(),
            config,
            matcher,
            input,
            state,
        })
    }

    /// A character following a VR rig. The facing comes from `model` when
    /// the configuration enables the direction predictor.
    pub fn tracked(
        database: MotionDatabase,
        variants: Vec<MotionDatabase>,
        config: MotionMatchingConfig,
        trackers: &TrackerFrame,
        model: Option<Arc<dyn DirectionModel>>,
    ) -> MotionMatchingResult<Self> {
        let direction = match model {
            Some(model) if config.direction.enabled => Some(DirectionPredictor::new(
                model,
                config.direction.normalization.clone(),
                config.direction.calibration.clone(),
                config.direction.sample_rate,
                trackers,
            )?),
            _ => None,
        };
        let input = TrackedInput::new(
            trackers,
            config.prediction_frames(),
            config.prediction.clone(),
            direction,
        );
        Self::new(database, variants, config, CharacterInput::Tracked(input))
    }

    /// A character steered from code, see [`DirectedInput`].
    pub fn directed(
        database: MotionDatabase,
        config: MotionMatchingConfig,
        initial: Transform,
    ) -> MotionMatchingResult<Self> {
        let mut config = config;
        config.squat.variant_ratios.clear();
        let input = DirectedInput::new(initial, config.prediction_frames(), config.prediction.clone());
        Self::new(database, Vec::new(), config, CharacterInput::Directed(input))
    }

    /// Runs one control tick. `trackers` is ignored by directed inputs.
    pub fn step(&mut self, trackers: Option<&TrackerFrame>, dt: f32) -> StepOutput {
        let mut events = Vec::new();

        let update = self.input.update(trackers, dt);
        if update.direction_reset {
            events.push(ControllerEvent::DirectionReset);
        }
        if update.quick_change {
            events.push(ControllerEvent::InputChangedQuickly);
            self.state.countdown = 0;
        }

        self.adjust_towards_input(dt);

        if self.state.countdown == 0 {
            self.search(&mut events);
            self.state.countdown = self.config.search_interval;
        } else {
            self.state.countdown -= 1;
        }

        let last_frame = self.database().poses().len().saturating_sub(1);
        if self.state.frame + 1 > last_frame {
            warn!(
                "Playback ran past the last database frame {last_frame}, holding it until the next search"
            );
            self.state.frame = last_frame;
            self.state.countdown = 0;
        } else {
            self.state.frame += 1;
        }

        self.update_pose(dt, &mut events);

        StepOutput {
            frame: self.state.frame,
            joints: (0..self.state.pose.len())
                .map(|joint| self.state.pose.global_transform(joint))
                .collect(),
            events,
        }
    }

    fn adjust_towards_input(&mut self, dt: f32) {
        let adjustment = self.config.adjustment.clone();
        let object = self.input.simulation_object();
        if adjustment.adjust {
            let translation = position_adjustment(
                self.state.root.translation,
                object.translation,
                self.state.velocity,
                &adjustment,
                dt,
            );
            let rotation = rotation_adjustment(
                self.state.root.rotation,
                object.rotation,
                self.state.angular_velocity,
                &adjustment,
                dt,
            );
            self.adjust_position(translation);
            self.adjust_rotation(rotation);
        }
        if adjustment.clamp {
            if let Some(translation) = clamp_adjustment(
                self.state.root.translation,
                object.translation,
                adjustment.max_distance,
            ) {
                self.adjust_position(translation);
            }
        }
    }

    fn search(&mut self, events: &mut Vec<ControllerEvent>) {
        let previous_variant = self.state.variant;
        if let Some(head_height) = self.input.head_height() {
            self.state.variant = select_variant(
                &self.config.squat.variant_ratios,
                head_height,
                self.state.calibrator.eyes_height(),
            )
            .min(self.databases.len() - 1);
        }
        let variant_changed = previous_variant != self.state.variant;
        if variant_changed {
            events.push(ControllerEvent::SquatVariantChanged {
                from: previous_variant,
                to: self.state.variant,
            });
        }

        let previous = &self.databases[previous_variant];
        let current = &self.databases[self.state.variant];
        let frame = self.state.frame;
        build_query(
            &mut self.state.query,
            previous.features(),
            current.features(),
            frame,
            self.state.root,
            self.input.predictions(),
        );

        let continuation = if variant_changed {
            None
        } else {
            self.matcher
                .continuation(current.features(), &self.state.query, frame)
        };
        let Some(best) = self
            .matcher
            .search(current.features(), &self.state.query, continuation)
        else {
            warn!("Search found no valid frame, keeping frame {frame}");
            return;
        };
        events.push(ControllerEvent::Searched {
            frame: best.frame,
            distance: best.distance,
            continued: best.frame == frame && !variant_changed,
        });

        if best.frame == frame && !variant_changed {
            return;
        }
        let (Some(source), Some(target)) = (
            previous.poses().pose(frame),
            current.poses().pose(best.frame),
        ) else {
            return;
        };
        if self.config.inertialize {
            self.state.inertializer.seed_transition(source, target);
        }
        self.state.anchors = Anchors::new(target, self.state.root);
        self.state.frame = best.frame;
        events.push(ControllerEvent::Transitioned {
            from: frame,
            to: best.frame,
        });
    }

    fn update_pose(&mut self, dt: f32, events: &mut Vec<ControllerEvent>) {
        let database = &self.databases[self.state.variant];
        let poses = database.poses();
        let Some(pose) = poses.pose(self.state.frame) else {
            return;
        };
        let skeleton = poses.skeleton();
        let state = &mut self.state;
        let inertialize = self.config.inertialize;
        let halflife = self.config.inertialize_halflife;

        if inertialize {
            state.inertializer.update(pose, halflife, dt);
        }

        let previous_root = state.root;
        state.root = state.anchors.to_world(
            pose.local_positions[SIMULATION_BONE],
            pose.local_rotations[SIMULATION_BONE],
        );
        if dt > 0.0 {
            state.velocity = (state.root.translation - previous_root.translation) / dt;
            state.angular_velocity =
                angular_velocity(previous_root.rotation, state.root.rotation, dt);
        }

        write_locals(
            &mut state.pose,
            skeleton,
            pose,
            state.root,
            inertialize.then_some(&state.inertializer),
        );

        let transitions = state.foot_lock.update(
            &mut state.pose,
            skeleton,
            [pose.left_foot_contact, pose.right_foot_contact],
            &mut state.inertializer,
            inertialize,
            halflife,
            dt,
        );
        events.extend(transitions.into_iter().map(|t| match t.transition {
            LockTransition::Lock => ControllerEvent::FootLocked {
                foot: t.foot,
                anchor: t.anchor,
            },
            LockTransition::Unlock => ControllerEvent::FootUnlocked { foot: t.foot },
        }));
    }

    /// Moves the world anchor, shifting the character by `translation`.
    pub fn adjust_position(&mut self, translation: Vec3) {
        self.state.anchors.world_position += translation;
    }

    /// Turns the character by `rotation` around its current root.
    pub fn adjust_rotation(&mut self, rotation: Quat) {
        let pivot = self.state.root.translation;
        let anchors = &mut self.state.anchors;
        anchors.world_position = pivot + rotation * (anchors.world_position - pivot);
        anchors.world_rotation = (rotation * anchors.world_rotation).normalize();
    }

    /// Stores the current head height as the standing eye height.
    pub fn calibrate(&mut self, now: f32) -> bool {
        match self.input.head_height() {
            Some(height) => self.state.calibrator.calibrate(height, now),
            None => false,
        }
    }

    /// Replaces the tuning. Feature and joint settings are fixed at creation.
    pub fn set_config(&mut self, config: MotionMatchingConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.matcher.set_weights(FeatureWeights::new(
            self.database().features().layout(),
            config.responsiveness,
            config.quality,
        ));
        self.state.foot_lock.set_config(config.foot_lock.clone());
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &MotionMatchingConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Dataset currently playing.
    pub fn database(&self) -> &MotionDatabase {
        &self.databases[self.state.variant]
    }

    pub fn skeleton(&self) -> &Skeleton {
        self.databases[0].poses().skeleton()
    }

    pub fn input(&self) -> &CharacterInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut CharacterInput {
        &mut self.input
    }

    pub fn frame(&self) -> usize {
        self.state.frame
    }

    pub fn variant(&self) -> usize {
        self.state.variant
    }

    pub fn root(&self) -> Transform {
        self.state.root
    }

    pub fn velocity(&self) -> Vec3 {
        self.state.velocity
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.state.angular_velocity
    }

    pub fn pose(&self) -> &SkeletonPose {
        &self.state.pose
    }

    pub fn predictions(&self) -> &[TrajectorySample] {
        self.input.predictions()
    }
}

/// Fills `target` with the world pose of a database `pose` placed at `root`,
/// with inertialized rotations and hips when `inertializer` is given.
fn write_locals(
    target: &mut SkeletonPose,
    skeleton: &Skeleton,
    pose: &PoseVector,
    root: Transform,
    inertializer: Option<&Inertializer>,
) {
    target.local_rotations.clear();
    target.local_positions.clear();
    match inertializer {
        Some(inertializer) => target
            .local_rotations
            .extend_from_slice(inertializer.rotations()),
        None => target
            .local_rotations
            .extend_from_slice(&pose.local_rotations),
    }
    target
        .local_positions
        .extend_from_slice(&pose.local_positions);

    if let Some(rotation) = target.local_rotations.get_mut(SIMULATION_BONE) {
        *rotation = root.rotation;
    }
    if let Some(position) = target.local_positions.get_mut(SIMULATION_BONE) {
        *position = root.translation;
    }
    if let (Some(position), Some(inertializer)) =
        (target.local_positions.get_mut(HIPS), inertializer)
    {
        *position = inertializer.hips_position();
    }
    target.recompute_globals(skeleton);
}
