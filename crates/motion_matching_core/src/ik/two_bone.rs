use crate::skeleton::{Skeleton, SkeletonPose};
use bevy::math::{Quat, Vec3};

/// Upper, lower and end joint of a two-bone chain, e.g. hip, knee, ankle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TwoBoneChain {
    pub root: usize,
    pub mid: usize,
    pub end: usize,
}

/// Swings for the root and mid joints, plus where the joints end up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoBoneSolution {
    pub root_swing: Quat,
    pub mid_swing: Quat,
    pub mid_position: Vec3,
    pub end_position: Vec3,
}

// Adapted from https://blog.littlepolygon.com/posts/twobone/
/// Analytic two-bone solve. The reach is clamped between fully folded and
/// fully extended, and the middle joint bends towards `pole`.
pub fn solve_two_bone(
    root_position: Vec3,
    mid_position: Vec3,
    end_position: Vec3,
    target: Vec3,
    pole: Vec3,
) -> TwoBoneSolution {
    let unchanged = TwoBoneSolution {
        root_swing: Quat::IDENTITY,
        mid_swing: Quat::IDENTITY,
        mid_position,
        end_position,
    };

    // bone lengths
    let upper_len = root_position.distance(mid_position);
    let lower_len = mid_position.distance(end_position);
    if upper_len <= f32::EPSILON || lower_len <= f32::EPSILON || !target.is_finite() {
        return unchanged;
    }

    // direction and clamped distance to the target
    let to_target = target - root_position;
    let Some(to_target_dir) = to_target
        .try_normalize()
        .or_else(|| (end_position - root_position).try_normalize())
    else {
        return unchanged;
    };
    let max_len = upper_len + lower_len;
    let min_len = (upper_len - lower_len).abs().max(1e-3 * max_len);
    let to_target_dist = to_target.length().clamp(min_len, max_len);

    // bend plane
    let pole_dir = pole
        .reject_from_normalized(to_target_dir)
        .try_normalize()
        .or_else(|| {
            (mid_position - root_position)
                .reject_from_normalized(to_target_dir)
                .try_normalize()
        })
        .unwrap_or_else(|| to_target_dir.any_orthonormal_vector());

    // law of cosines for the root angle
    let cos_angle = ((to_target_dist * to_target_dist + upper_len * upper_len
        - lower_len * lower_len)
        / (2.0 * upper_len * to_target_dist))
        .clamp(-1.0, 1.0);
    let sin_angle = (1.0 - cos_angle * cos_angle).max(0.0).sqrt();

    let out_end = root_position + to_target_dir * to_target_dist;
    let out_mid =
        root_position + to_target_dir * (upper_len * cos_angle) + pole_dir * (upper_len * sin_angle);

    // final rotations
    let root_swing = arc(mid_position - root_position, out_mid - root_position);
    let in_end_with_root_swing = root_position + root_swing * (end_position - root_position);
    let mid_swing = arc(in_end_with_root_swing - out_mid, out_end - out_mid) * root_swing;

    TwoBoneSolution {
        root_swing,
        mid_swing,
        mid_position: out_mid,
        end_position: out_end,
    }
}

fn arc(from: Vec3, to: Vec3) -> Quat {
    match (from.try_normalize(), to.try_normalize()) {
        (Some(from), Some(to)) => Quat::from_rotation_arc(from, to),
        _ => Quat::IDENTITY,
    }
}

/// Solves `chain` inside `pose` so its end reaches `target`, keeping the end
/// joint's global rotation, then refreshes the globals.
pub fn apply_two_bone_ik(
    pose: &mut SkeletonPose,
    skeleton: &Skeleton,
    chain: TwoBoneChain,
    target: Vec3,
    pole: Vec3,
) {
    let solution = solve_two_bone(
        pose.global_position(chain.root),
        pose.global_position(chain.mid),
        pose.global_position(chain.end),
        target,
        pole,
    );

    let parent_rotation = skeleton
        .parent(chain.root)
        .map_or(Quat::IDENTITY, |parent| pose.global_rotation(parent));
    let root_rotation = (solution.root_swing * pose.global_rotation(chain.root)).normalize();
    let mid_rotation = (solution.mid_swing * pose.global_rotation(chain.mid)).normalize();
    let end_rotation = pose.global_rotation(chain.end);

    let locals = &mut pose.local_rotations;
    if let Some(local) = locals.get_mut(chain.root) {
        *local = (parent_rotation.inverse() * root_rotation).normalize();
    }
    if let Some(local) = locals.get_mut(chain.mid) {
        *local = (root_rotation.inverse() * mid_rotation).normalize();
    }
    if let Some(local) = locals.get_mut(chain.end) {
        *local = (mid_rotation.inverse() * end_rotation).normalize();
    }
    pose.recompute_globals(skeleton);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Joint;

    fn leg() -> (Skeleton, SkeletonPose, TwoBoneChain) {
        let skeleton = Skeleton::new(vec![
            Joint::new("hips", None, Vec3::new(0.0, 1.0, 0.0)),
            Joint::new("upper", Some(0), Vec3::ZERO),
            Joint::new("lower", Some(1), Vec3::new(0.0, -0.45, 0.0)),
            Joint::new("foot", Some(2), Vec3::new(0.0, -0.45, 0.0)),
        ])
        .unwrap();
        let offsets = skeleton.joints().iter().map(|j| j.local_offset).collect();
        // Slightly bent knee.
        let rotations = vec![
            Quat::IDENTITY,
            Quat::from_rotation_x(-0.2),
            Quat::from_rotation_x(0.4),
            Quat::from_rotation_x(-0.2),
        ];
        let pose = SkeletonPose::from_locals(&skeleton, rotations, offsets);
        (
            skeleton,
            pose,
            TwoBoneChain {
                root: 1,
                mid: 2,
                end: 3,
            },
        )
    }

    #[test]
    fn reaches_a_target_within_range() {
        let (skeleton, mut pose, chain) = leg();
        let target = Vec3::new(0.1, 0.3, 0.2);
        apply_two_bone_ik(&mut pose, &skeleton, chain, target, Vec3::Z);
        assert!(pose.global_position(chain.end).abs_diff_eq(target, 1e-4));
        // Knee bends towards the pole.
        let knee = pose.global_position(chain.mid);
        let root = pose.global_position(chain.root);
        let axis = (target - root).normalize();
        assert!((knee - root).reject_from_normalized(axis).dot(Vec3::Z) > 0.0);
    }

    #[test]
    fn keeps_bone_lengths_and_foot_rotation() {
        let (skeleton, mut pose, chain) = leg();
        let foot_rotation = pose.global_rotation(chain.end);
        apply_two_bone_ik(&mut pose, &skeleton, chain, Vec3::new(-0.2, 0.4, 0.1), Vec3::Z);
        let root = pose.global_position(chain.root);
        let knee = pose.global_position(chain.mid);
        let foot = pose.global_position(chain.end);
        assert!((root.distance(knee) - 0.45).abs() < 1e-4);
        assert!((knee.distance(foot) - 0.45).abs() < 1e-4);
        assert!(pose.global_rotation(chain.end).angle_between(foot_rotation) < 1e-3);
    }

    #[test]
    fn unreachable_target_fully_extends() {
        let (skeleton, mut pose, chain) = leg();
        let root = pose.global_position(chain.root);
        // 150% of the chain length.
        let direction = Vec3::new(0.3, -1.0, 0.4).normalize();
        let target = root + direction * 0.9 * 1.5;
        apply_two_bone_ik(&mut pose, &skeleton, chain, target, Vec3::Z);

        let knee = pose.global_position(chain.mid);
        let foot = pose.global_position(chain.end);
        assert!(knee.is_finite() && foot.is_finite());
        assert!(foot.abs_diff_eq(root + direction * 0.9, 1e-4));
        assert!(knee.abs_diff_eq(root + direction * 0.45, 1e-4));
    }

    #[test]
    fn target_on_the_root_fully_folds() {
        let solution = solve_two_bone(
            Vec3::ZERO,
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(0.0, -0.8, 0.0),
            Vec3::ZERO,
            Vec3::Z,
        );
        assert!(solution.end_position.is_finite());
        assert!((solution.end_position.length() - 0.2).abs() < 1e-4);
        assert!(solution.mid_position.is_finite());
    }
}
