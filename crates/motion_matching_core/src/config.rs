use crate::{
    direction::{DirectionNormalization, TrackerCalibration},
    errors::ConfigError,
    feature_set::{FeatureDescriptor, FeatureKind},
    foot_lock::{FootLockConfig, LegJointNames},
    matching::DEFAULT_PARALLEL_THRESHOLD,
    trajectory::{AdjustmentConfig, PredictionTuning},
};
use bevy::reflect::Reflect;
use serde::{Deserialize, Serialize};

/// Everything that tunes one motion matching character.
///
/// Serialized as RON; every field has a default so a config file only needs
/// to name what it changes.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MotionMatchingConfig {
    pub features: Vec<FeatureDescriptor>,
    /// Ticks between two searches.
    pub search_interval: usize,
    pub inertialize: bool,
    pub inertialize_halflife: f32,
    /// Scales the trajectory feature weights.
    pub responsiveness: f32,
    /// Scales the pose feature weights.
    pub quality: f32,
    /// Databases at least this large are searched in parallel.
    pub parallel_threshold: usize,
    pub prediction: PredictionTuning,
    pub adjustment: AdjustmentConfig,
    pub foot_lock: FootLockConfig,
    pub left_leg: LegJointNames,
    pub right_leg: LegJointNames,
    pub squat: SquatConfig,
    pub direction: DirectionConfig,
}

impl Default for MotionMatchingConfig {
    fn default() -> Self {
        Self {
            features: default_features(),
            search_interval: 10,
            inertialize: true,
            inertialize_halflife: 0.1,
            responsiveness: 1.0,
            quality: 1.0,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            prediction: PredictionTuning::default(),
            adjustment: AdjustmentConfig::default(),
            foot_lock: FootLockConfig::default(),
            left_leg: LegJointNames {
                upper: "LeftUpLeg".into(),
                lower: "LeftLeg".into(),
                foot: "LeftFoot".into(),
                toes: "LeftToe".into(),
            },
            right_leg: LegJointNames {
                upper: "RightUpLeg".into(),
                lower: "RightLeg".into(),
                foot: "RightFoot".into(),
                toes: "RightToe".into(),
            },
            squat: SquatConfig::default(),
            direction: DirectionConfig::default(),
        }
    }
}

/// Head-tracked trajectory plus feet and hips, the usual VR setup.
fn default_features() -> Vec<FeatureDescriptor> {
    let trajectory = |name: &str, kind| FeatureDescriptor {
        name: name.into(),
        kind,
        joint: "Head".into(),
        prediction_frames: vec![20, 40, 60],
        ..Default::default()
    };
    let pose = |name: &str, kind, joint: &str| FeatureDescriptor {
        name: name.into(),
        kind,
        joint: joint.into(),
        ..Default::default()
    };
    vec![
        trajectory("head_trajectory", FeatureKind::TrajectoryPosition),
        trajectory("head_direction", FeatureKind::TrajectoryDirection),
        pose("left_foot_position", FeatureKind::JointPosition, "LeftToe"),
        pose("right_foot_position", FeatureKind::JointPosition, "RightToe"),
        pose("left_foot_velocity", FeatureKind::JointVelocity, "LeftToe"),
        pose("right_foot_velocity", FeatureKind::JointVelocity, "RightToe"),
        pose("hips_velocity", FeatureKind::JointVelocity, "Hips"),
    ]
}

/// Crouched variants of the database, picked by head height.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SquatConfig {
    /// Head height over eye height that activates each variant. Below 1 the
    /// variant is picked under that ratio, above 1 over it.
    pub variant_ratios: Vec<f32>,
    /// Eye height used until the user calibrates.
    pub default_eyes_height: f32,
    /// Seconds between two calibrations.
    pub calibration_cooldown: f32,
}

impl Default for SquatConfig {
    fn default() -> Self {
        Self {
            variant_ratios: Vec::new(),
            default_eyes_height: 1.8,
            calibration_cooldown: 2.0,
        }
    }
}

/// Facing prediction from all three trackers instead of the head alone.
#[derive(Reflect, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DirectionConfig {
    pub enabled: bool,
    /// Rate the model was trained at.
    pub sample_rate: f32,
    pub normalization: DirectionNormalization,
    pub calibration: TrackerCalibration,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 90.0,
            normalization: DirectionNormalization::default(),
            calibration: TrackerCalibration::default(),
        }
    }
}

impl MotionMatchingConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_ron_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = ron::de::from_bytes(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Trajectory frames shared by every trajectory feature.
    pub fn prediction_frames(&self) -> Vec<usize> {
        self.features
            .iter()
            .find(|feature| feature.kind.is_trajectory())
            .map(|feature| feature.prediction_frames.clone())
            .unwrap_or_default()
    }

    /// Range checks that do not need a skeleton.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &str, reason: String| {
            Err(ConfigError::InvalidParameter {
                name: name.into(),
                reason,
            })
        };
        if self.features.is_empty() {
            return Err(ConfigError::EmptyLayout);
        }
        if self.search_interval == 0 {
            return invalid("search_interval", "must be at least 1".into());
        }
        for (name, value) in [
            ("inertialize_halflife", self.inertialize_halflife),
            ("squat.default_eyes_height", self.squat.default_eyes_height),
            ("prediction.average_fps", self.prediction.average_fps),
        ] {
            if !(value > 0.0) {
                return invalid(name, format!("must be positive, got {value}"));
            }
        }
        for (name, value) in [
            ("responsiveness", self.responsiveness),
            ("quality", self.quality),
            (
                "prediction.responsiveness_positions",
                self.prediction.responsiveness_positions,
            ),
            (
                "prediction.responsiveness_directions",
                self.prediction.responsiveness_directions,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(name, format!("must be within [0, 1], got {value}"));
            }
        }
        if let Some(ratio) = self
            .squat
            .variant_ratios
            .iter()
            .find(|ratio| !(**ratio > 0.0) || **ratio == 1.0)
        {
            return invalid(
                "squat.variant_ratios",
                format!("{ratio} never selects a variant"),
            );
        }
        if self.foot_lock.lower_leg_local_forward.length_squared() <= f32::EPSILON {
            return invalid("foot_lock.lower_leg_local_forward", "must not be zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = MotionMatchingConfig::from_ron_str("()").unwrap();
        assert_eq!(config, MotionMatchingConfig::default());
        assert_eq!(config.search_interval, 10);
        assert_eq!(config.prediction_frames(), vec![20, 40, 60]);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = MotionMatchingConfig::from_ron_str(
            r#"(
                search_interval: 5,
                inertialize: false,
                foot_lock: (unlock_distance: 0.3),
                prediction: (responsiveness_positions: 0.5),
                squat: (variant_ratios: [0.7]),
            )"#,
        )
        .unwrap();
        assert_eq!(config.search_interval, 5);
        assert!(!config.inertialize);
        assert_eq!(config.foot_lock.unlock_distance, 0.3);
        assert!(config.foot_lock.enabled);
        assert_eq!(config.prediction.responsiveness_positions, 0.5);
        assert_eq!(config.prediction.responsiveness_directions, 0.75);
        assert_eq!(config.squat.variant_ratios, vec![0.7]);
        assert_eq!(config.squat.default_eyes_height, 1.8);
    }

    #[test]
    fn features_parse_with_defaults() {
        let config = MotionMatchingConfig::from_ron_str(
            r#"(
                features: [
                    (name: "traj", kind: TrajectoryPosition, joint: "Head", prediction_frames: [10, 20]),
                    (name: "foot", kind: JointPosition, joint: "LeftToe", weight: 2.0),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(config.features.len(), 2);
        assert!(config.features[0].project_to_ground);
        assert_eq!(config.features[1].weight, 2.0);
        assert_eq!(config.prediction_frames(), vec![10, 20]);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            MotionMatchingConfig::from_ron_str("(search_interval: 0)"),
            Err(ConfigError::InvalidParameter { name, .. }) if name == "search_interval"
        ));
        assert!(matches!(
            MotionMatchingConfig::from_ron_str("(quality: 1.5)"),
            Err(ConfigError::InvalidParameter { name, .. }) if name == "quality"
        ));
        assert!(matches!(
            MotionMatchingConfig::from_ron_str("(squat: (variant_ratios: [1.0]))"),
            Err(ConfigError::InvalidParameter { .. })
        ));
        assert_eq!(
            MotionMatchingConfig::from_ron_str("(features: [])"),
            Err(ConfigError::EmptyLayout)
        );
    }

    #[test]
    fn malformed_ron_is_a_config_error() {
        assert!(matches!(
            MotionMatchingConfig::from_ron_str("(search_interval: \"ten\")"),
            Err(ConfigError::Ron(_))
        ));
    }

    #[test]
    fn survives_a_ron_round_trip() {
        let config = MotionMatchingConfig::default();
        let text = config.to_ron_string().unwrap();
        assert_eq!(MotionMatchingConfig::from_ron_str(&text).unwrap(), config);
    }
}
