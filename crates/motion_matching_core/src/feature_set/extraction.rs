use super::{FeatureKind, FeatureLayout, FeatureSet, ResolvedFeature};
use crate::{
    errors::FeatureSetError,
    math::project_on_ground,
    pose_set::PoseSet,
    skeleton::{SkeletonPose, global_to_character_direction, global_to_character_position},
};
use bevy::{
    log::{info, warn},
    math::Vec3,
};

impl FeatureSet {
    /// Extracts and normalizes the features of every frame of `poses`.
    ///
    /// A frame is invalid when its furthest trajectory sample would fall past
    /// the end of its clip. Invalid frames still get a vector (sampled at the
    /// clip's last frame) but are excluded from statistics and search.
    pub fn extract(poses: &PoseSet, layout: FeatureLayout) -> Result<Self, FeatureSetError> {
        let size = layout.size();
        let max_future = layout.max_future_frame();
        let fk: Vec<SkeletonPose> = (0..poses.len())
            .filter_map(|frame| poses.skeleton_pose(frame))
            .collect();

        let mut features = vec![0.0; poses.len() * size];
        let mut valid = vec![false; poses.len()];

        for clip in poses.clips() {
            for frame in clip.start..clip.end {
                valid[frame] = frame + max_future < clip.end;
                let row = &mut features[frame * size..(frame + 1) * size];
                let sampler = FrameSampler {
                    fk: &fk,
                    frame,
                    last: clip.end - 1,
                    frame_time: poses.frame_time(),
                };
                for feature in layout.features() {
                    sampler.write(feature, row);
                }
            }
        }

        let valid_count = valid.iter().filter(|v| **v).count();
        if valid_count < valid.len() {
            warn!(
                "{} of {} frames are too close to the end of their clip and will never be matched",
                valid.len() - valid_count,
                valid.len()
            );
        }
        info!(
            "Extracted {} features of {} dimensions",
            valid.len(),
            size
        );

        FeatureSet::from_raw(layout, features, valid)
    }
}

struct FrameSampler<'a> {
    fk: &'a [SkeletonPose],
    frame: usize,
    last: usize,
    frame_time: f32,
}

impl FrameSampler<'_> {
    fn write(&self, feature: &ResolvedFeature, row: &mut [f32]) {
        let current = &self.fk[self.frame];
        let character = current.character_transform();
        match feature.kind {
            FeatureKind::TrajectoryPosition => {
                for (index, &offset) in feature.prediction_frames.iter().enumerate() {
                    let future = &self.fk[(self.frame + offset).min(self.last)];
                    let mut value =
                        global_to_character_position(character, future.global_position(feature.joint));
                    if feature.project_to_ground {
                        value = project_on_ground(value);
                    }
                    feature.write_sample(row, index, value);
                }
            }
            FeatureKind::TrajectoryDirection => {
                for (index, &offset) in feature.prediction_frames.iter().enumerate() {
                    let future = &self.fk[(self.frame + offset).min(self.last)];
                    let world = future.global_rotation(feature.joint) * feature.local_forward;
                    let mut value = global_to_character_direction(character, world);
                    if feature.project_to_ground {
                        value = project_on_ground(value).normalize_or_zero();
                    }
                    feature.write_sample(row, index, value);
                }
            }
            FeatureKind::JointPosition => {
                feature.write_sample(row, 0, current.character_position(feature.joint));
            }
            FeatureKind::JointVelocity => {
                // Forward difference, backward on the last frame of the clip.
                let (from, to) = if self.frame < self.last {
                    (self.frame, self.frame + 1)
                } else {
                    (self.frame.saturating_sub(1), self.frame)
                };
                let velocity = if from == to {
                    Vec3::ZERO
                } else {
                    (self.fk[to].global_position(feature.joint)
                        - self.fk[from].global_position(feature.joint))
                        / self.frame_time
                };
                feature.write_sample(
                    row,
                    0,
                    global_to_character_direction(character, velocity),
                );
            }
        }
    }
}
