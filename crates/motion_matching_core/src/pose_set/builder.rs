use super::{ClipRange, Foot, PoseSet, PoseVector};
use crate::{
    errors::DatasetError,
    math::angular_velocity,
    skeleton::{HIPS, SIMULATION_BONE, Skeleton, SkeletonPose},
};
use bevy::{
    log::info,
    math::{Quat, Vec3},
};

/// One decoded frame of a motion clip.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipFrame {
    pub local_rotations: Vec<Quat>,
    pub local_positions: Vec<Vec3>,
    /// Finite-differenced from the positions when absent.
    pub local_velocities: Option<Vec<Vec3>>,
    pub local_angular_velocities: Option<Vec<Vec3>>,
    /// Detected from the toe joints when absent and detection is enabled.
    pub contacts: Option<[bool; 2]>,
}

impl ClipFrame {
    /// Frame where only the simulation bone and the hips translate, every
    /// other joint sits at its rest offset.
    pub fn from_root_motion(
        skeleton: &Skeleton,
        root_position: Vec3,
        hips_position: Vec3,
        local_rotations: Vec<Quat>,
    ) -> Self {
        let local_positions = skeleton
            .joints()
            .iter()
            .enumerate()
            .map(|(index, joint)| match index {
                SIMULATION_BONE => root_position,
                HIPS => hips_position,
                _ => joint.local_offset,
            })
            .collect();
        Self {
            local_rotations,
            local_positions,
            local_velocities: None,
            local_angular_velocities: None,
            contacts: None,
        }
    }

    pub fn with_contacts(mut self, left: bool, right: bool) -> Self {
        self.contacts = Some([left, right]);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionClip {
    pub name: String,
    pub frames: Vec<ClipFrame>,
}

/// Toe-based contact detection: a toe touches the ground when it is both low
/// and slow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactDetection {
    pub left_toes: usize,
    pub right_toes: usize,
    pub height_threshold: f32,
    pub velocity_threshold: f32,
}

impl ContactDetection {
    fn toes(&self, foot: Foot) -> usize {
        match foot {
            Foot::Left => self.left_toes,
            Foot::Right => self.right_toes,
        }
    }
}

/// Assembles a [`PoseSet`] from already decoded clips.
pub struct PoseSetBuilder {
    skeleton: Skeleton,
    frame_time: f32,
    contact_detection: Option<ContactDetection>,
    poses: Vec<PoseVector>,
    clips: Vec<ClipRange>,
}

impl PoseSetBuilder {
    pub fn new(skeleton: Skeleton, frame_time: f32) -> Self {
        Self {
            skeleton,
            frame_time,
            contact_detection: None,
            poses: Vec::new(),
            clips: Vec::new(),
        }
    }

    pub fn with_contact_detection(mut self, detection: ContactDetection) -> Self {
        self.contact_detection = Some(detection);
        self
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn add_clip(&mut self, clip: MotionClip) -> Result<&mut Self, DatasetError> {
        if !(self.frame_time.is_finite() && self.frame_time > 0.0) {
            return Err(DatasetError::InvalidFrameTime(self.frame_time));
        }
        if clip.frames.is_empty() {
            return Err(DatasetError::EmptyClip(clip.name));
        }

        let start = self.poses.len();
        let joint_count = self.skeleton.len();
        for (offset, frame) in clip.frames.iter().enumerate() {
            let found = [frame.local_rotations.len(), frame.local_positions.len()]
                .into_iter()
                .chain(frame.local_velocities.as_ref().map(Vec::len))
                .chain(frame.local_angular_velocities.as_ref().map(Vec::len))
                .find(|&found| found != joint_count);
            if let Some(found) = found {
                return Err(DatasetError::JointCountMismatch {
                    frame: start + offset,
                    expected: joint_count,
                    found,
                });
            }
        }

        let detected = self
            .contact_detection
            .map(|detection| self.detect_contacts(&clip.frames, detection));

        for (index, frame) in clip.frames.iter().enumerate() {
            // The last frame reuses the derivative of the one before it.
            let (from, to) = match clip.frames.len() {
                1 => (0, 0),
                len if index + 1 == len => (index - 1, index),
                _ => (index, index + 1),
            };
            let local_velocities = frame.local_velocities.clone().unwrap_or_else(|| {
                finite_difference(
                    &clip.frames[from].local_positions,
                    &clip.frames[to].local_positions,
                    self.frame_time,
                )
            });
            let local_angular_velocities =
                frame.local_angular_velocities.clone().unwrap_or_else(|| {
                    clip.frames[from]
                        .local_rotations
                        .iter()
                        .zip(&clip.frames[to].local_rotations)
                        .map(|(&a, &b)| {
                            if from == to {
                                Vec3::ZERO
                            } else {
                                angular_velocity(a, b, self.frame_time)
                            }
                        })
                        .collect()
                });
            let [left_foot_contact, right_foot_contact] = frame
                .contacts
                .or_else(|| detected.as_ref().map(|contacts| contacts[index]))
                .unwrap_or_default();

            self.poses.push(PoseVector {
                local_rotations: frame.local_rotations.clone(),
                local_positions: frame.local_positions.clone(),
                local_velocities,
                local_angular_velocities,
                left_foot_contact,
                right_foot_contact,
            });
        }

        self.clips.push(ClipRange {
            name: clip.name,
            start,
            end: self.poses.len(),
        });
        Ok(self)
    }

    pub fn build(self) -> Result<PoseSet, DatasetError> {
        info!(
            "Building pose set with {} frames in {} clips",
            self.poses.len(),
            self.clips.len()
        );
        PoseSet::new(self.skeleton, self.frame_time, self.poses, self.clips)
    }

    fn detect_contacts(&self, frames: &[ClipFrame], detection: ContactDetection) -> Vec<[bool; 2]> {
        let toe_positions: Vec<[Vec3; 2]> = frames
            .iter()
            .map(|frame| {
                let pose = SkeletonPose::from_locals(
                    &self.skeleton,
                    frame.local_rotations.clone(),
                    frame.local_positions.clone(),
                );
                Foot::ALL.map(|foot| pose.global_position(detection.toes(foot)))
            })
            .collect();

        (0..toe_positions.len())
            .map(|index| {
                let previous = index.saturating_sub(1);
                Foot::ALL.map(|foot| {
                    let position = toe_positions[index][foot.index()];
                    let speed = if index == previous {
                        0.0
                    } else {
                        (position - toe_positions[previous][foot.index()]).length()
                            / self.frame_time
                    };
                    position.y < detection.height_threshold
                        && speed < detection.velocity_threshold
                })
            })
            .collect()
    }
}

fn finite_difference(from: &[Vec3], to: &[Vec3], dt: f32) -> Vec<Vec3> {
    from.iter().zip(to).map(|(&a, &b)| (b - a) / dt).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn derives_velocities_by_finite_differences() {
        let skeleton = testing::biped_skeleton();
        let rotations = vec![Quat::IDENTITY; skeleton.len()];
        let frames = (0..3)
            .map(|i| {
                ClipFrame::from_root_motion(
                    &skeleton,
                    Vec3::new(0.0, 0.0, i as f32 * 0.1),
                    Vec3::new(0.0, 0.9, 0.0),
                    rotations.clone(),
                )
            })
            .collect();
        let mut builder = PoseSetBuilder::new(skeleton, 0.1);
        builder
            .add_clip(MotionClip {
                name: "forward".into(),
                frames,
            })
            .unwrap();
        let set = builder.build().unwrap();

        for frame in 0..3 {
            let velocity = set.pose(frame).unwrap().local_velocities[SIMULATION_BONE];
            assert!(velocity.abs_diff_eq(Vec3::Z, 1e-5));
        }
    }

    #[test]
    fn clips_are_laid_out_back_to_back() {
        let skeleton = testing::biped_skeleton();
        let rotations = vec![Quat::IDENTITY; skeleton.len()];
        let frame = ClipFrame::from_root_motion(&skeleton, Vec3::ZERO, Vec3::Y, rotations);
        let mut builder = PoseSetBuilder::new(skeleton, 1.0 / 30.0);
        builder
            .add_clip(MotionClip {
                name: "a".into(),
                frames: vec![frame.clone(); 3],
            })
            .unwrap()
            .add_clip(MotionClip {
                name: "b".into(),
                frames: vec![frame; 2],
            })
            .unwrap();
        let set = builder.build().unwrap();

        assert_eq!(set.len(), 5);
        assert_eq!(set.clips()[1].start, 3);
        assert_eq!(set.clip_of(4).map(|clip| clip.name.as_str()), Some("b"));
    }

    #[test]
    fn rejects_empty_clip() {
        let mut builder = PoseSetBuilder::new(testing::biped_skeleton(), 1.0 / 30.0);
        let result = builder.add_clip(MotionClip {
            name: "nothing".into(),
            frames: vec![],
        });
        assert!(matches!(result, Err(DatasetError::EmptyClip(name)) if name == "nothing"));
    }

    #[test]
    fn detects_contacts_from_low_slow_toes() {
        let skeleton = testing::biped_skeleton();
        let left_toes = skeleton.require(testing::LEFT_TOES).unwrap();
        let right_toes = skeleton.require(testing::RIGHT_TOES).unwrap();
        let rotations = vec![Quat::IDENTITY; skeleton.len()];
        let hips_heights = [0.9, 0.9, 1.4];
        let frames = hips_heights
            .iter()
            .map(|&height| {
                ClipFrame::from_root_motion(
                    &skeleton,
                    Vec3::ZERO,
                    Vec3::new(0.0, height, 0.0),
                    rotations.clone(),
                )
            })
            .collect();
        let mut builder = PoseSetBuilder::new(skeleton, 1.0 / 30.0).with_contact_detection(
            ContactDetection {
                left_toes,
                right_toes,
                height_threshold: 0.1,
                velocity_threshold: 1.0,
            },
        );
        builder
            .add_clip(MotionClip {
                name: "jump".into(),
                frames,
            })
            .unwrap();
        let set = builder.build().unwrap();

        assert!(set.pose(0).unwrap().contact(Foot::Left));
        assert!(set.pose(1).unwrap().contact(Foot::Right));
        assert!(!set.pose(2).unwrap().contact(Foot::Left));
    }
}
