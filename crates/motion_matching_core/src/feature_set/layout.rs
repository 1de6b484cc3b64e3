use crate::{errors::ConfigError, math::FORWARD, skeleton::Skeleton};
use bevy::{math::Vec3, reflect::Reflect};
use serde::{Deserialize, Serialize};

#[derive(Reflect, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureKind {
    /// Future positions of a joint, in the character space of the frame.
    TrajectoryPosition,
    /// Future facing of a joint (its local forward axis in world space).
    TrajectoryDirection,
    JointPosition,
    JointVelocity,
}

impl FeatureKind {
    pub fn is_trajectory(self) -> bool {
        matches!(
            self,
            FeatureKind::TrajectoryPosition | FeatureKind::TrajectoryDirection
        )
    }
}

/// One logical feature as written in the configuration.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FeatureDescriptor {
    pub name: String,
    pub kind: FeatureKind,
    pub joint: String,
    pub weight: f32,
    /// Future frame offsets, trajectory features only.
    pub prediction_frames: Vec<usize>,
    /// Keep only the ground plane components (x, z).
    pub project_to_ground: bool,
    /// Local axis of `joint` taken as its facing direction.
    pub local_forward: Vec3,
}

impl Default for FeatureDescriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: FeatureKind::JointPosition,
            joint: String::new(),
            weight: 1.0,
            prediction_frames: Vec::new(),
            project_to_ground: true,
            local_forward: FORWARD,
        }
    }
}

/// A descriptor bound to a skeleton and placed in the feature vector.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResolvedFeature {
    pub name: String,
    pub kind: FeatureKind,
    pub joint: usize,
    pub weight: f32,
    pub prediction_frames: Vec<usize>,
    pub project_to_ground: bool,
    pub local_forward: Vec3,
    /// First dimension of this feature in the vector.
    pub offset: usize,
}

impl ResolvedFeature {
    /// Components per sample.
    pub fn components(&self) -> usize {
        if self.kind.is_trajectory() && self.project_to_ground {
            2
        } else {
            3
        }
    }

    pub fn dimensions(&self) -> usize {
        if self.kind.is_trajectory() {
            self.components() * self.prediction_frames.len()
        } else {
            3
        }
    }

    /// Writes a sample into `vector` at this feature's slot for prediction
    /// `index`.
    pub fn write_sample(&self, vector: &mut [f32], index: usize, value: Vec3) {
        let start = self.offset + index * self.components();
        if self.components() == 2 {
            vector[start] = value.x;
            vector[start + 1] = value.z;
        } else {
            vector[start..start + 3].copy_from_slice(&value.to_array());
        }
    }
}

/// Feature vector layout: trajectory features first, then pose features.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FeatureLayout {
    features: Vec<ResolvedFeature>,
    trajectory_frames: Vec<usize>,
    pose_offset: usize,
    size: usize,
}

impl FeatureLayout {
    /// Binds the descriptors to `skeleton`. Trajectory features are moved in
    /// front of pose features, keeping their relative order.
    pub fn new(descriptors: &[FeatureDescriptor], skeleton: &Skeleton) -> Result<Self, ConfigError> {
        let ordered = descriptors
            .iter()
            .filter(|d| d.kind.is_trajectory())
            .chain(descriptors.iter().filter(|d| !d.kind.is_trajectory()));

        let mut features = Vec::with_capacity(descriptors.len());
        let mut trajectory_frames: Option<Vec<usize>> = None;
        let mut offset = 0;
        let mut pose_offset = 0;

        for descriptor in ordered {
            let joint = skeleton.require(&descriptor.joint)?;
            if !descriptor.weight.is_finite() || descriptor.weight < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name: format!("{}.weight", descriptor.name),
                    reason: format!("must be a non-negative number, got {}", descriptor.weight),
                });
            }

            if descriptor.kind.is_trajectory() {
                if descriptor.prediction_frames.is_empty()
                    || descriptor.prediction_frames.contains(&0)
                {
                    return Err(ConfigError::InvalidParameter {
                        name: format!("{}.prediction_frames", descriptor.name),
                        reason: "must list positive future frame offsets".into(),
                    });
                }
                // Predicted positions carry no height the database could match.
                if descriptor.kind == FeatureKind::TrajectoryPosition
                    && !descriptor.project_to_ground
                {
                    return Err(ConfigError::InvalidParameter {
                        name: format!("{}.project_to_ground", descriptor.name),
                        reason: "trajectory positions must be projected to the ground".into(),
                    });
                }
                match &trajectory_frames {
                    None => trajectory_frames = Some(descriptor.prediction_frames.clone()),
                    Some(expected) if *expected != descriptor.prediction_frames => {
                        return Err(ConfigError::PredictionFramesMismatch {
                            feature: descriptor.name.clone(),
                            expected: expected.clone(),
                            found: descriptor.prediction_frames.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }

            let feature = ResolvedFeature {
                name: descriptor.name.clone(),
                kind: descriptor.kind,
                joint,
                weight: descriptor.weight,
                prediction_frames: if descriptor.kind.is_trajectory() {
                    descriptor.prediction_frames.clone()
                } else {
                    Vec::new()
                },
                project_to_ground: descriptor.project_to_ground,
                local_forward: descriptor.local_forward.normalize_or(FORWARD),
                offset,
            };
            offset += feature.dimensions();
            if feature.kind.is_trajectory() {
                pose_offset = offset;
            }
            features.push(feature);
        }

        if offset == 0 {
            return Err(ConfigError::EmptyLayout);
        }

        Ok(Self {
            features,
            trajectory_frames: trajectory_frames.unwrap_or_default(),
            pose_offset,
            size: offset,
        })
    }

    pub fn features(&self) -> &[ResolvedFeature] {
        &self.features
    }

    pub fn trajectory_features(&self) -> impl Iterator<Item = &ResolvedFeature> {
        self.features.iter().filter(|f| f.kind.is_trajectory())
    }

    /// Future frame offsets shared by every trajectory feature.
    pub fn trajectory_frames(&self) -> &[usize] {
        &self.trajectory_frames
    }

    pub fn max_future_frame(&self) -> usize {
        self.trajectory_frames.iter().copied().max().unwrap_or(0)
    }

    /// Index where trajectory features end and pose features begin.
    pub fn pose_offset(&self) -> usize {
        self.pose_offset
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
