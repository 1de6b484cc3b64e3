use crate::{
    feature_set::{FeatureKind, FeatureLayout, FeatureSet},
    math::project_on_ground,
    skeleton::{global_to_character_direction, global_to_character_position},
    trajectory::TrajectorySample,
};
use bevy::transform::components::Transform;

/// Builds the search query into `query`.
///
/// The pose part is the feature vector of `frame` in `previous`, moved from
/// the normalization of `previous` to the one of `current`. The trajectory
/// part is replaced by `predictions`, expressed in the space of `root`.
pub fn build_query(
    query: &mut Vec<f32>,
    previous: &FeatureSet,
    current: &FeatureSet,
    frame: usize,
    root: Transform,
    predictions: &[TrajectorySample],
) {
    query.clear();
    match previous.feature(frame) {
        Some(row) => query.extend_from_slice(row),
        None => query.resize(previous.feature_size(), 0.0),
    }
    previous.denormalize_vector(query);
    current.normalize_vector(query);
    fill_trajectory(query, current.layout(), root, predictions);
    current.normalize_trajectory(query);
}

/// Writes raw trajectory features from world-space `predictions`.
pub fn fill_trajectory(
    query: &mut [f32],
    layout: &FeatureLayout,
    root: Transform,
    predictions: &[TrajectorySample],
) {
    for feature in layout.trajectory_features() {
        for (index, sample) in predictions
            .iter()
            .enumerate()
            .take(feature.prediction_frames.len())
        {
            let value = match feature.kind {
                FeatureKind::TrajectoryPosition => {
                    let position = global_to_character_position(root, sample.position);
                    if feature.project_to_ground {
                        project_on_ground(position)
                    } else {
                        position
                    }
                }
                FeatureKind::TrajectoryDirection => {
                    let direction = global_to_character_direction(root, sample.direction);
                    if feature.project_to_ground {
                        project_on_ground(direction).normalize_or_zero()
                    } else {
                        direction
                    }
                }
                FeatureKind::JointPosition | FeatureKind::JointVelocity => continue,
            };
            feature.write_sample(query, index, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feature_set::FeatureLayout,
        math::FORWARD,
        testing,
    };
    use bevy::math::{Quat, Vec3};

    #[test]
    fn pose_part_survives_a_same_set_rebuild() {
        let set = testing::walk_feature_set(120);
        let mut query = Vec::new();
        build_query(&mut query, &set, &set, 15, Transform::IDENTITY, &[]);
        let row = set.feature(15).unwrap();
        let offset = set.pose_offset();
        for (q, r) in query[offset..].iter().zip(&row[offset..]) {
            assert!((q - r).abs() < 1e-4);
        }
    }

    #[test]
    fn predictions_are_expressed_in_root_space() {
        let set = testing::walk_feature_set(120);
        let root = Transform::from_xyz(1.0, 0.0, 2.0).with_rotation(Quat::from_rotation_y(
            std::f32::consts::FRAC_PI_2,
        ));
        // One meter ahead of a root turned to face +X.
        let sample = TrajectorySample {
            position: Vec3::new(2.0, 1.6, 2.0),
            direction: Vec3::X,
        };
        let predictions = [sample; 3];
        let mut raw = vec![0.0; set.feature_size()];
        fill_trajectory(&mut raw, set.layout(), root, &predictions);
        // Position (x, z) then direction (x, z) blocks.
        assert!(raw[0].abs() < 1e-5 && (raw[1] - 1.0).abs() < 1e-5);
        assert!(raw[6].abs() < 1e-5 && (raw[7] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn trajectory_part_is_normalized() {
        let set = testing::walk_feature_set(120);
        let mut query = Vec::new();
        let predictions = [TrajectorySample {
            position: Vec3::new(0.0, 1.6, 1.0),
            direction: Vec3::Z,
        }; 3];
        build_query(&mut query, &set, &set, 15, Transform::IDENTITY, &predictions);
        let mut expected = vec![0.0; set.feature_size()];
        fill_trajectory(&mut expected, set.layout(), Transform::IDENTITY, &predictions);
        set.normalize_trajectory(&mut expected);
        assert_eq!(&query[..set.pose_offset()], &expected[..set.pose_offset()]);
    }

    #[test]
    fn predictions_of_the_recorded_motion_match_its_features() {
        let poses = testing::walk_pose_set(120);
        let mut descriptors = testing::feature_descriptors();
        for descriptor in &mut descriptors {
            if descriptor.kind == FeatureKind::TrajectoryDirection {
                descriptor.project_to_ground = false;
            }
        }
        let layout = FeatureLayout::new(&descriptors, poses.skeleton()).unwrap();
        let set = FeatureSet::extract(&poses, layout).unwrap();

        let frame = 25;
        let head = poses.skeleton().require("Head").unwrap();
        let root = poses.skeleton_pose(frame).unwrap().character_transform();
        let predictions: Vec<TrajectorySample> = set
            .layout()
            .trajectory_frames()
            .iter()
            .map(|offset| {
                let future = poses.skeleton_pose(frame + offset).unwrap();
                TrajectorySample {
                    position: future.global_position(head),
                    direction: future.global_rotation(head) * FORWARD,
                }
            })
            .collect();

        let mut raw = vec![0.0; set.feature_size()];
        fill_trajectory(&mut raw, set.layout(), root, &predictions);
        let expected = set.denormalized_feature(frame).unwrap();
        for (q, e) in raw[..set.pose_offset()].iter().zip(&expected) {
            assert!((q - e).abs() < 1e-4, "{q} != {e}");
        }
    }
}
