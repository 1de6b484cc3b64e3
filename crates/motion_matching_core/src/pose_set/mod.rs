mod builder;
mod serial;

pub use builder::*;
pub use serial::*;

use crate::{
    errors::DatasetError,
    skeleton::{Skeleton, SkeletonPose},
};
use bevy::{
    math::{Quat, Vec3},
    reflect::Reflect,
};
use serde::{Deserialize, Serialize};

#[derive(Reflect, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Foot {
    Left,
    Right,
}

impl Foot {
    pub const ALL: [Foot; 2] = [Foot::Left, Foot::Right];

    pub fn index(self) -> usize {
        match self {
            Foot::Left => 0,
            Foot::Right => 1,
        }
    }
}

/// One sampled frame of the database.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PoseVector {
    pub local_rotations: Vec<Quat>,
    /// Joint 0 moves freely and joint 1 (hips) carries its animated offset,
    /// every other joint holds its rest offset.
    pub local_positions: Vec<Vec3>,
    pub local_velocities: Vec<Vec3>,
    pub local_angular_velocities: Vec<Vec3>,
    pub left_foot_contact: bool,
    pub right_foot_contact: bool,
}

impl PoseVector {
    pub fn joint_count(&self) -> usize {
        self.local_rotations.len()
    }

    pub fn contact(&self, foot: Foot) -> bool {
        match foot {
            Foot::Left => self.left_foot_contact,
            Foot::Right => self.right_foot_contact,
        }
    }

    fn joint_count_mismatch(&self, expected: usize) -> Option<usize> {
        [
            self.local_rotations.len(),
            self.local_positions.len(),
            self.local_velocities.len(),
            self.local_angular_velocities.len(),
        ]
        .into_iter()
        .find(|&found| found != expected)
    }
}

/// A contiguous range `[start, end)` of frames recorded as one take.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClipRange {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl ClipRange {
    pub fn contains(&self, frame: usize) -> bool {
        (self.start..self.end).contains(&frame)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable animation database: poses sharing one skeleton and frame time.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseSet {
    skeleton: Skeleton,
    frame_time: f32,
    poses: Vec<PoseVector>,
    clips: Vec<ClipRange>,
}

impl PoseSet {
    /// Validates and assembles a pose set. An empty `clips` list treats the
    /// whole set as a single clip.
    pub fn new(
        skeleton: Skeleton,
        frame_time: f32,
        poses: Vec<PoseVector>,
        mut clips: Vec<ClipRange>,
    ) -> Result<Self, DatasetError> {
        if !(frame_time.is_finite() && frame_time > 0.0) {
            return Err(DatasetError::InvalidFrameTime(frame_time));
        }
        if poses.is_empty() {
            return Err(DatasetError::Empty);
        }
        for (frame, pose) in poses.iter().enumerate() {
            if let Some(found) = pose.joint_count_mismatch(skeleton.len()) {
                return Err(DatasetError::JointCountMismatch {
                    frame,
                    expected: skeleton.len(),
                    found,
                });
            }
        }
        if clips.is_empty() {
            clips.push(ClipRange {
                name: "all".into(),
                start: 0,
                end: poses.len(),
            });
        }
        for clip in &clips {
            if clip.start >= clip.end || clip.end > poses.len() {
                return Err(DatasetError::InvalidClipRange {
                    start: clip.start,
                    end: clip.end,
                    pose_count: poses.len(),
                });
            }
        }
        let mut ordered: Vec<&ClipRange> = clips.iter().collect();
        ordered.sort_by_key(|clip| clip.start);
        for pair in ordered.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(DatasetError::OverlappingClips {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }

        Ok(Self {
            skeleton,
            frame_time,
            poses,
            clips,
        })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn pose(&self, frame: usize) -> Option<&PoseVector> {
        self.poses.get(frame)
    }

    pub fn poses(&self) -> &[PoseVector] {
        &self.poses
    }

    pub fn clips(&self) -> &[ClipRange] {
        &self.clips
    }

    pub fn clip_of(&self, frame: usize) -> Option<&ClipRange> {
        self.clips.iter().find(|clip| clip.contains(frame))
    }

    /// Forward kinematics of a database frame, in the dataset's own space.
    pub fn skeleton_pose(&self, frame: usize) -> Option<SkeletonPose> {
        let pose = self.poses.get(frame)?;
        Some(SkeletonPose::from_locals(
            &self.skeleton,
            pose.local_rotations.clone(),
            pose.local_positions.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn rejects_invalid_frame_time() {
        let set = testing::walk_pose_set(10);
        let result = PoseSet::new(set.skeleton().clone(), 0.0, set.poses().to_vec(), vec![]);
        assert_eq!(result, Err(DatasetError::InvalidFrameTime(0.0)));
    }

    #[test]
    fn rejects_joint_count_mismatch() {
        let set = testing::walk_pose_set(4);
        let mut poses = set.poses().to_vec();
        poses[2].local_velocities.pop();
        let expected = set.skeleton().len();
        assert_eq!(
            PoseSet::new(set.skeleton().clone(), 1.0 / 60.0, poses, vec![]),
            Err(DatasetError::JointCountMismatch {
                frame: 2,
                expected,
                found: expected - 1,
            })
        );
    }

    #[test]
    fn rejects_clip_out_of_range() {
        let set = testing::walk_pose_set(4);
        let clips = vec![ClipRange {
            name: "walk".into(),
            start: 2,
            end: 9,
        }];
        assert_eq!(
            PoseSet::new(set.skeleton().clone(), 1.0 / 60.0, set.poses().to_vec(), clips),
            Err(DatasetError::InvalidClipRange {
                start: 2,
                end: 9,
                pose_count: 4,
            })
        );
    }

    #[test]
    fn rejects_overlapping_clips() {
        let set = testing::walk_pose_set(10);
        let clip = |name: &str, start, end| ClipRange {
            name: name.into(),
            start,
            end,
        };
        let overlapping = vec![clip("turn", 4, 10), clip("walk", 0, 5)];
        assert_eq!(
            PoseSet::new(set.skeleton().clone(), 1.0 / 60.0, set.poses().to_vec(), overlapping),
            Err(DatasetError::OverlappingClips {
                first: "walk".into(),
                second: "turn".into(),
            })
        );

        let adjacent = vec![clip("walk", 0, 5), clip("turn", 5, 10)];
        let set = PoseSet::new(set.skeleton().clone(), 1.0 / 60.0, set.poses().to_vec(), adjacent)
            .unwrap();
        assert_eq!(set.clip_of(5).map(|clip| clip.name.as_str()), Some("turn"));
    }

    #[test]
    fn missing_clips_cover_everything() {
        let set = testing::walk_pose_set(6);
        assert_eq!(set.clips().len(), 1);
        assert_eq!(set.clip_of(5).map(|clip| clip.end), Some(6));
        assert!(set.clip_of(6).is_none());
    }
}
