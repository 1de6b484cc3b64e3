use bevy::{
    math::{Quat, Vec3},
    transform::components::Transform,
};

use super::{SIMULATION_BONE, Skeleton};

/// Local joint transforms together with the globals derived from them.
///
/// The root local transform is taken as its global transform, so a pose
/// whose root is placed in the world yields world-space globals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletonPose {
    pub local_rotations: Vec<Quat>,
    pub local_positions: Vec<Vec3>,
    global_rotations: Vec<Quat>,
    global_positions: Vec<Vec3>,
}

impl SkeletonPose {
    pub fn from_locals(
        skeleton: &Skeleton,
        local_rotations: Vec<Quat>,
        local_positions: Vec<Vec3>,
    ) -> Self {
        let mut pose = Self {
            local_rotations,
            local_positions,
            global_rotations: Vec::new(),
            global_positions: Vec::new(),
        };
        pose.recompute_globals(skeleton);
        pose
    }

    pub fn len(&self) -> usize {
        self.local_rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_rotations.is_empty()
    }

    /// Forward kinematics, one pass in joint order.
    pub fn recompute_globals(&mut self, skeleton: &Skeleton) {
        let count = self
            .local_rotations
            .len()
            .min(self.local_positions.len())
            .min(skeleton.len());
        self.global_rotations.clear();
        self.global_positions.clear();
        self.global_rotations.reserve(count);
        self.global_positions.reserve(count);

        for joint in 0..count {
            let local_rotation = self.local_rotations[joint];
            let local_position = self.local_positions[joint];
            match skeleton.parent(joint) {
                Some(parent) => {
                    let parent_rotation = self.global_rotations[parent];
                    let parent_position = self.global_positions[parent];
                    self.global_rotations
                        .push((parent_rotation * local_rotation).normalize());
                    self.global_positions
                        .push(parent_position + parent_rotation * local_position);
                }
                None => {
                    self.global_rotations.push(local_rotation);
                    self.global_positions.push(local_position);
                }
            }
        }
    }

    pub fn global_rotation(&self, joint: usize) -> Quat {
        self.global_rotations
            .get(joint)
            .copied()
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn global_position(&self, joint: usize) -> Vec3 {
        self.global_positions
            .get(joint)
            .copied()
            .unwrap_or(Vec3::ZERO)
    }

    pub fn global_transform(&self, joint: usize) -> Transform {
        Transform {
            translation: self.global_position(joint),
            rotation: self.global_rotation(joint),
            ..Transform::IDENTITY
        }
    }

    pub fn local_transform(&self, joint: usize) -> Transform {
        Transform {
            translation: self.local_positions.get(joint).copied().unwrap_or_default(),
            rotation: self
                .local_rotations
                .get(joint)
                .copied()
                .unwrap_or(Quat::IDENTITY),
            ..Transform::IDENTITY
        }
    }

    /// Global transform of the simulation bone, which defines character space.
    pub fn character_transform(&self) -> Transform {
        self.global_transform(SIMULATION_BONE)
    }

    /// Position of `joint` relative to the simulation bone.
    pub fn character_position(&self, joint: usize) -> Vec3 {
        global_to_character_position(self.character_transform(), self.global_position(joint))
    }

    pub fn character_rotation(&self, joint: usize) -> Quat {
        self.global_rotation(SIMULATION_BONE).inverse() * self.global_rotation(joint)
    }
}

/// Expresses a global point in the space of `character`.
pub fn global_to_character_position(character: Transform, position: Vec3) -> Vec3 {
    character.rotation.inverse() * (position - character.translation)
}

pub fn global_to_character_direction(character: Transform, direction: Vec3) -> Vec3 {
    character.rotation.inverse() * direction
}

pub fn character_to_global_position(character: Transform, position: Vec3) -> Vec3 {
    character.translation + character.rotation * position
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn forward_kinematics_chains_rotations() {
        let skeleton = Skeleton::new(vec![
            Joint::new("root", None, Vec3::ZERO),
            Joint::new("a", Some(0), Vec3::X),
            Joint::new("b", Some(1), Vec3::X),
        ])
        .unwrap();
        let pose = SkeletonPose::from_locals(
            &skeleton,
            vec![
                Quat::IDENTITY,
                Quat::from_rotation_z(FRAC_PI_2),
                Quat::IDENTITY,
            ],
            vec![Vec3::new(0.0, 0.0, 1.0), Vec3::X, Vec3::X],
        );
        assert!(pose.global_position(1).abs_diff_eq(Vec3::new(1.0, 0.0, 1.0), 1e-6));
        assert!(pose.global_position(2).abs_diff_eq(Vec3::new(1.0, 1.0, 1.0), 1e-6));
        assert!(pose.character_position(2).abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn character_space_roundtrip() {
        let character = Transform::from_translation(Vec3::new(2.0, 0.0, -1.0))
            .with_rotation(Quat::from_rotation_y(0.7));
        let p = Vec3::new(0.3, 1.6, 0.2);
        let local = global_to_character_position(character, p);
        assert!(character_to_global_position(character, local).abs_diff_eq(p, 1e-5));
    }
}
