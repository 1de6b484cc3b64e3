//! Inertialization: jumps between database frames are absorbed by offsets
//! that decay towards zero on top of the new animation.
//!
//! See <https://theorangeduck.com/page/spring-roll-call#inertialization>.

use crate::{
    math::quat_abs,
    pose_set::{Foot, PoseVector},
    skeleton::{HIPS, SIMULATION_BONE},
    spring::{decay_spring_damper_implicit, decay_spring_damper_implicit_quat},
};
use bevy::math::{Quat, Vec3};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ContactOffset {
    offset: Vec3,
    offset_velocity: Vec3,
    position: Vec3,
    velocity: Vec3,
}

/// Decaying per-joint rotation offsets plus hips and foot contact offsets.
///
/// The simulation bone is never offset: its motion is carried by the
/// controller's world anchors.
#[derive(Clone, Debug, PartialEq)]
pub struct Inertializer {
    offset_rotations: Vec<Quat>,
    offset_angular_velocities: Vec<Vec3>,
    offset_hips: Vec3,
    offset_hips_velocity: Vec3,
    contacts: [ContactOffset; 2],

    rotations: Vec<Quat>,
    angular_velocities: Vec<Vec3>,
    hips_position: Vec3,
    hips_velocity: Vec3,
}

impl Inertializer {
    /// Starts at rest on `pose`.
    pub fn new(pose: &PoseVector) -> Self {
        let joints = pose.joint_count();
        Self {
            offset_rotations: vec![Quat::IDENTITY; joints],
            offset_angular_velocities: vec![Vec3::ZERO; joints],
            offset_hips: Vec3::ZERO,
            offset_hips_velocity: Vec3::ZERO,
            contacts: [ContactOffset::default(); 2],
            rotations: pose.local_rotations.clone(),
            angular_velocities: pose.local_angular_velocities.clone(),
            hips_position: hips(pose, &pose.local_positions),
            hips_velocity: hips(pose, &pose.local_velocities),
        }
    }

    /// Folds the difference between `source` (the frame that would have been
    /// shown) and `target` (the frame jumped to) into the offsets.
    pub fn seed_transition(&mut self, source: &PoseVector, target: &PoseVector) {
        let joints = self
            .offset_rotations
            .len()
            .min(source.joint_count())
            .min(target.joint_count());
        for joint in (0..joints).filter(|&joint| joint != SIMULATION_BONE) {
            self.offset_rotations[joint] = quat_abs(
                self.offset_rotations[joint]
                    * source.local_rotations[joint]
                    * target.local_rotations[joint].inverse(),
            )
            .normalize();
            self.offset_angular_velocities[joint] += source.local_angular_velocities[joint]
                - target.local_angular_velocities[joint];
        }

        self.offset_hips +=
            hips(source, &source.local_positions) - hips(target, &target.local_positions);
        self.offset_hips_velocity +=
            hips(source, &source.local_velocities) - hips(target, &target.local_velocities);
    }

    /// Decays the offsets by `dt` and applies them on top of `target`.
    pub fn update(&mut self, target: &PoseVector, halflife: f32, dt: f32) {
        let joints = self.offset_rotations.len().min(target.joint_count());
        self.rotations.resize(joints, Quat::IDENTITY);
        self.angular_velocities.resize(joints, Vec3::ZERO);

        for joint in 0..joints {
            if joint == SIMULATION_BONE {
                self.rotations[joint] = target.local_rotations[joint];
                self.angular_velocities[joint] = target.local_angular_velocities[joint];
                continue;
            }
            decay_spring_damper_implicit_quat(
                &mut self.offset_rotations[joint],
                &mut self.offset_angular_velocities[joint],
                halflife,
                dt,
            );
            self.rotations[joint] =
                (self.offset_rotations[joint] * target.local_rotations[joint]).normalize();
            self.angular_velocities[joint] =
                self.offset_angular_velocities[joint] + target.local_angular_velocities[joint];
        }

        decay_spring_damper_implicit(
            &mut self.offset_hips,
            &mut self.offset_hips_velocity,
            halflife,
            dt,
        );
        self.hips_position = hips(target, &target.local_positions) + self.offset_hips;
        self.hips_velocity = hips(target, &target.local_velocities) + self.offset_hips_velocity;
    }

    /// Re-seeds one contact anchor when it switches from `src` to `dst`.
    pub fn contact_transition(
        &mut self,
        foot: Foot,
        src_position: Vec3,
        src_velocity: Vec3,
        dst_position: Vec3,
        dst_velocity: Vec3,
    ) {
        let contact = &mut self.contacts[foot.index()];
        contact.offset = (src_position + contact.offset) - dst_position;
        contact.offset_velocity = (src_velocity + contact.offset_velocity) - dst_velocity;
    }

    /// Decays the contact offsets and applies them to the raw contact inputs,
    /// given as `(position, velocity)` per foot.
    pub fn update_contacts(&mut self, inputs: [(Vec3, Vec3); 2], halflife: f32, dt: f32) {
        for (contact, (position, velocity)) in self.contacts.iter_mut().zip(inputs) {
            decay_spring_damper_implicit(
                &mut contact.offset,
                &mut contact.offset_velocity,
                halflife,
                dt,
            );
            contact.position = position + contact.offset;
            contact.velocity = velocity + contact.offset_velocity;
        }
    }

    /// Clears every offset.
    pub fn reset(&mut self, pose: &PoseVector) {
        let contacts = self.contacts.map(|contact| ContactOffset {
            offset: Vec3::ZERO,
            offset_velocity: Vec3::ZERO,
            ..contact
        });
        *self = Self::new(pose);
        self.contacts = contacts;
    }

    pub fn rotations(&self) -> &[Quat] {
        &self.rotations
    }

    pub fn angular_velocities(&self) -> &[Vec3] {
        &self.angular_velocities
    }

    pub fn hips_position(&self) -> Vec3 {
        self.hips_position
    }

    pub fn hips_velocity(&self) -> Vec3 {
        self.hips_velocity
    }

    pub fn contact_position(&self, foot: Foot) -> Vec3 {
        self.contacts[foot.index()].position
    }

    pub fn contact_velocity(&self, foot: Foot) -> Vec3 {
        self.contacts[foot.index()].velocity
    }

    /// Largest remaining rotation offset, in radians.
    pub fn max_rotation_offset(&self) -> f32 {
        // asin of the vector part stays precise for tiny angles.
        self.offset_rotations
            .iter()
            .map(|offset| 2.0 * quat_abs(*offset).xyz().length().min(1.0).asin())
            .fold(0.0, f32::max)
    }

    pub fn hips_offset(&self) -> Vec3 {
        self.offset_hips
    }

    pub fn contact_offset(&self, foot: Foot) -> Vec3 {
        self.contacts[foot.index()].offset
    }
}

fn hips(pose: &PoseVector, values: &[Vec3]) -> Vec3 {
    if pose.joint_count() > HIPS {
        values[HIPS]
    } else {
        Vec3::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn two_poses() -> (PoseVector, PoseVector) {
        let set = testing::walk_pose_set(60);
        let mut source = set.pose(0).unwrap().clone();
        let mut target = set.pose(30).unwrap().clone();
        // Same velocities so the offsets start at rest.
        source.local_angular_velocities = target.local_angular_velocities.clone();
        source.local_velocities = target.local_velocities.clone();
        source.local_rotations[2] = Quat::from_rotation_x(0.6) * target.local_rotations[2];
        target.local_positions[HIPS] += Vec3::new(0.0, 0.05, 0.02);
        (source, target)
    }

    #[test]
    fn first_update_shows_the_source_pose() {
        let (source, target) = two_poses();
        let mut inertializer = Inertializer::new(&source);
        inertializer.seed_transition(&source, &target);
        inertializer.update(&target, 0.1, 0.0);

        for joint in 1..source.joint_count() {
            let shown = inertializer.rotations()[joint];
            assert!(
                shown.angle_between(source.local_rotations[joint]) < 1e-3,
                "joint {joint}"
            );
        }
        assert!(
            inertializer
                .hips_position()
                .abs_diff_eq(source.local_positions[HIPS], 1e-5)
        );
    }

    #[test]
    fn offsets_decay_monotonically_to_zero() {
        let (source, target) = two_poses();
        let mut inertializer = Inertializer::new(&source);
        inertializer.seed_transition(&source, &target);

        let mut previous_rotation = inertializer.max_rotation_offset();
        let mut previous_hips = inertializer.hips_offset().length();
        let mut steps = 0;
        while previous_rotation > 0.0 || previous_hips > 0.0 {
            inertializer.update(&target, 0.1, 1.0 / 60.0);
            let rotation = inertializer.max_rotation_offset();
            let hips = inertializer.hips_offset().length();
            assert!(rotation < previous_rotation || rotation == 0.0);
            assert!(hips < previous_hips || hips == 0.0);
            previous_rotation = rotation;
            previous_hips = hips;
            steps += 1;
            assert!(steps < 2000, "offsets did not reach zero");
        }

        for (shown, expected) in inertializer.rotations().iter().zip(&target.local_rotations) {
            assert!(shown.angle_between(*expected) < 1e-5);
        }
    }

    #[test]
    fn offsets_seeded_while_moving_still_decay_monotonically() {
        let (mut source, target) = two_poses();
        // Offsets start out moving away from zero as well as towards it.
        source.local_angular_velocities[2] += Vec3::new(4.0, 0.0, 0.0);
        source.local_angular_velocities[4] -= Vec3::new(0.0, 0.0, 6.0);
        source.local_velocities[HIPS] += Vec3::new(0.0, -1.5, 0.8);

        let mut inertializer = Inertializer::new(&source);
        inertializer.seed_transition(&source, &target);
        let halflife = 0.1;
        let dt = 1.0 / 60.0;

        let mut previous_rotation = inertializer.max_rotation_offset();
        let mut previous_hips = inertializer.hips_offset().length();
        assert!(previous_rotation > 0.0 && previous_hips > 0.0);
        for _ in 0..((10.0 * halflife / dt) as usize) {
            inertializer.update(&target, halflife, dt);
            let rotation = inertializer.max_rotation_offset();
            let hips = inertializer.hips_offset().length();
            assert!(rotation <= previous_rotation);
            assert!(hips <= previous_hips);
            previous_rotation = rotation;
            previous_hips = hips;
        }
        assert!(previous_rotation < 1e-4 && previous_hips < 1e-4);
        for _ in 0..2000 {
            inertializer.update(&target, halflife, dt);
        }
        assert_eq!(inertializer.max_rotation_offset(), 0.0);
        assert_eq!(inertializer.hips_offset(), Vec3::ZERO);
    }

    #[test]
    fn offsets_are_negligible_after_ten_halflives() {
        let (source, target) = two_poses();
        let mut inertializer = Inertializer::new(&source);
        inertializer.seed_transition(&source, &target);
        let halflife = 0.1;
        for _ in 0..100 {
            inertializer.update(&target, halflife, 0.01);
        }
        assert!(inertializer.max_rotation_offset() < 1e-3);
        assert!(inertializer.hips_offset().length() < 1e-4);
    }

    #[test]
    fn contact_transition_keeps_output_continuous() {
        let (pose, _) = two_poses();
        let mut inertializer = Inertializer::new(&pose);
        let src = Vec3::new(0.2, 0.0, 1.0);
        let dst = Vec3::new(0.5, 0.0, 1.3);
        inertializer.update_contacts([(src, Vec3::ZERO); 2], 0.05, 1.0 / 60.0);
        inertializer.contact_transition(Foot::Left, src, Vec3::ZERO, dst, Vec3::ZERO);
        inertializer.update_contacts([(dst, Vec3::ZERO); 2], 0.05, 0.0);

        assert!(inertializer.contact_position(Foot::Left).abs_diff_eq(src, 1e-6));
        assert!(inertializer.contact_position(Foot::Right).abs_diff_eq(dst, 1e-6));
    }

    #[test]
    fn simulation_bone_is_never_offset() {
        let (mut source, target) = two_poses();
        source.local_rotations[SIMULATION_BONE] = Quat::from_rotation_y(1.0);
        let mut inertializer = Inertializer::new(&source);
        inertializer.seed_transition(&source, &target);
        inertializer.update(&target, 0.1, 0.0);
        assert_eq!(
            inertializer.rotations()[SIMULATION_BONE],
            target.local_rotations[SIMULATION_BONE]
        );
    }
}
