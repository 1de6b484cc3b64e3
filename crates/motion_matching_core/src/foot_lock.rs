//! Keeps feet planted while the database says they are in contact.
//!
//! Each foot is either unlocked (the toes follow the animation) or locked to
//! a world-space anchor. Switching between the two re-seeds the contact
//! inertialization so the anchor never jumps, and a two-bone IK pass moves
//! the leg so the toes land on the (inertialized) anchor.

use crate::{
    errors::ConfigError,
    ik::{TwoBoneChain, apply_two_bone_ik},
    inertialization::Inertializer,
    math::FORWARD,
    pose_set::Foot,
    skeleton::{Skeleton, SkeletonPose},
};
use bevy::{math::Vec3, reflect::Reflect};
use serde::{Deserialize, Serialize};

/// Joint names of one leg, hip to toes.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LegJointNames {
    pub upper: String,
    pub lower: String,
    pub foot: String,
    pub toes: String,
}

impl LegJointNames {
    pub fn resolve(&self, skeleton: &Skeleton) -> Result<LegJoints, ConfigError> {
        Ok(LegJoints {
            upper: skeleton.require(&self.upper)?,
            lower: skeleton.require(&self.lower)?,
            foot: skeleton.require(&self.foot)?,
            toes: skeleton.require(&self.toes)?,
        })
    }
}

/// Joint indices of one leg.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegJoints {
    pub upper: usize,
    pub lower: usize,
    pub foot: usize,
    pub toes: usize,
}

impl LegJoints {
    pub fn chain(&self) -> TwoBoneChain {
        TwoBoneChain {
            root: self.upper,
            mid: self.lower,
            end: self.foot,
        }
    }
}

#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FootLockConfig {
    /// Apply the IK. Lock states are tracked either way.
    pub enabled: bool,
    /// Distance between anchor and animated toes (m) that breaks a lock.
    pub unlock_distance: f32,
    /// Contact speed (m/s) under which a foot may lock.
    pub contact_velocity_threshold: f32,
    /// Axis of the lower leg, in its local space, the knee bends towards.
    pub lower_leg_local_forward: Vec3,
}

impl Default for FootLockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            unlock_distance: 0.2,
            contact_velocity_threshold: 0.15,
            lower_leg_local_forward: FORWARD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockTransition {
    Lock,
    Unlock,
}

/// Lock state machine of a single foot.
///
/// Locks when the database flags a contact and the contact moves slower
/// than the threshold. Unlocks when the flag drops or the animated toes
/// drifted farther than the unlock distance from the anchor.
pub fn next_lock_state(
    locked: bool,
    contact_flag: bool,
    contact_speed: f32,
    anchor_distance: f32,
    config: &FootLockConfig,
) -> Option<LockTransition> {
    if !locked && contact_flag && contact_speed < config.contact_velocity_threshold {
        Some(LockTransition::Lock)
    } else if locked && (!contact_flag || anchor_distance > config.unlock_distance) {
        Some(LockTransition::Unlock)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct FootState {
    locked: bool,
    anchor: Vec3,
    pole: Vec3,
    previous_toes: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FootLockTransition {
    pub foot: Foot,
    pub transition: LockTransition,
    pub anchor: Vec3,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FootLockSolver {
    legs: [LegJoints; 2],
    config: FootLockConfig,
    feet: [FootState; 2],
}

impl FootLockSolver {
    /// Starts unlocked with the toes of the world-space `pose`.
    pub fn new(legs: [LegJoints; 2], config: FootLockConfig, pose: &SkeletonPose) -> Self {
        let feet = legs.map(|leg| FootState {
            locked: false,
            anchor: pose.global_position(leg.toes),
            pole: pose.global_rotation(leg.lower) * config.lower_leg_local_forward,
            previous_toes: pose.global_position(leg.toes),
        });
        Self { legs, config, feet }
    }

    pub fn config(&self) -> &FootLockConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: FootLockConfig) {
        self.config = config;
    }

    pub fn legs(&self) -> &[LegJoints; 2] {
        &self.legs
    }

    pub fn is_locked(&self, foot: Foot) -> bool {
        self.feet[foot.index()].locked
    }

    /// Anchor of a locked foot.
    pub fn anchor(&self, foot: Foot) -> Option<Vec3> {
        let state = &self.feet[foot.index()];
        state.locked.then_some(state.anchor)
    }

    /// Unlocks both feet without any transition, e.g. after a teleport.
    pub fn reset(&mut self, pose: &SkeletonPose) {
        *self = Self::new(self.legs, self.config.clone(), pose);
    }

    /// Runs one tick on the world-space `pose` (globals are world
    /// transforms), updating lock states, contact inertialization and the
    /// leg IK. `inertialize` off makes lock changes snap.
    pub fn update(
        &mut self,
        pose: &mut SkeletonPose,
        skeleton: &Skeleton,
        contacts: [bool; 2],
        inertializer: &mut Inertializer,
        inertialize: bool,
        halflife: f32,
        dt: f32,
    ) -> Vec<FootLockTransition> {
        // animated toes and their velocity
        let mut toes = [(Vec3::ZERO, Vec3::ZERO); 2];
        for (state, (leg, toes)) in self.feet.iter_mut().zip(self.legs.iter().zip(&mut toes)) {
            let position = pose.global_position(leg.toes);
            let velocity = if dt > 0.0 {
                (position - state.previous_toes) / dt
            } else {
                Vec3::ZERO
            };
            state.previous_toes = position;
            *toes = (position, velocity);
        }

        let inputs = [0, 1].map(|i| {
            let state = &self.feet[i];
            if state.locked {
                (state.anchor, Vec3::ZERO)
            } else {
                toes[i]
            }
        });
        inertializer.update_contacts(inputs, halflife, dt);

        let mut transitions = Vec::new();
        let mut targets = [Vec3::ZERO; 2];
        for foot in Foot::ALL {
            let i = foot.index();
            let leg = self.legs[i];
            let (toes_position, toes_velocity) = toes[i];
            let contact_position = inertializer.contact_position(foot);
            let contact_velocity = inertializer.contact_velocity(foot);
            targets[i] = contact_position;

            let state = &mut self.feet[i];
            let transition = next_lock_state(
                state.locked,
                contacts[i],
                contact_velocity.length(),
                state.anchor.distance(toes_position),
                &self.config,
            );
            match transition {
                Some(LockTransition::Lock) => {
                    state.locked = true;
                    state.anchor = contact_position;
                    state.pole =
                        pose.global_rotation(leg.lower) * self.config.lower_leg_local_forward;
                    if inertialize {
                        inertializer.contact_transition(
                            foot,
                            toes_position,
                            toes_velocity,
                            state.anchor,
                            Vec3::ZERO,
                        );
                    }
                }
                Some(LockTransition::Unlock) => {
                    state.locked = false;
                    if inertialize {
                        inertializer.contact_transition(
                            foot,
                            state.anchor,
                            Vec3::ZERO,
                            toes_position,
                            toes_velocity,
                        );
                    }
                }
                None => {}
            }
            if let Some(transition) = transition {
                transitions.push(FootLockTransition {
                    foot,
                    transition,
                    anchor: state.anchor,
                });
            }
        }

        if self.config.enabled {
            for foot in Foot::ALL {
                let i = foot.index();
                let leg = self.legs[i];
                let pole = if self.feet[i].locked {
                    self.feet[i].pole
                } else {
                    pose.global_rotation(leg.lower) * self.config.lower_leg_local_forward
                };
                let foot_to_toes = pose.global_position(leg.foot) - pose.global_position(leg.toes);
                apply_two_bone_ik(pose, skeleton, leg.chain(), targets[i] + foot_to_toes, pole);
            }
        }

        transitions
    }
}
