use crate::{
    assets::{FeatureSetAsset, MotionMatchingSetup, PoseSetAsset},
    errors::AssetLoaderError,
};
use bevy::{
    asset::{AssetLoader, LoadContext, LoadedAsset, io::Reader},
    log::warn,
    reflect::TypePath,
};
use motion_matching_core::{
    config::MotionMatchingConfig,
    database::MotionDatabase,
    feature_set::{FeatureLayout, FeatureSet},
    pose_set::PoseSet,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Default, TypePath)]
pub struct PoseSetLoader;

impl AssetLoader for PoseSetLoader {
    type Asset = PoseSetAsset;
    type Settings = ();
    type Error = AssetLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).await?;
        Ok(PoseSetAsset(Arc::new(PoseSet::from_bytes(&bytes)?)))
    }

    fn extensions(&self) -> &[&str] {
        &["poses.mpk"]
    }
}

#[derive(Default, TypePath)]
pub struct FeatureSetLoader;

impl AssetLoader for FeatureSetLoader {
    type Asset = FeatureSetAsset;
    type Settings = ();
    type Error = AssetLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).await?;
        Ok(FeatureSetAsset(Arc::new(FeatureSet::from_bytes(&bytes)?)))
    }

    fn extensions(&self) -> &[&str] {
        &["features.mpk"]
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DatabaseSourceSerial {
    pub poses: String,
    pub features: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MotionMatchingSetupSerial {
    pub poses: String,
    pub features: String,
    #[serde(default)]
    pub squat_variants: Vec<DatabaseSourceSerial>,
    #[serde(default)]
    pub config: MotionMatchingConfig,
}

#[derive(Default, TypePath)]
pub struct MotionMatchingSetupLoader;

impl AssetLoader for MotionMatchingSetupLoader {
    type Asset = MotionMatchingSetup;
    type Settings = ();
    type Error = AssetLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).await?;
        let serial: MotionMatchingSetupSerial = ron::de::from_bytes(&bytes)?;
        serial.config.validate()?;

        let main = DatabaseSourceSerial {
            poses: serial.poses,
            features: serial.features,
        };
        let database = load_database(load_context, &main, &serial.config).await?;
        let mut squat_variants = Vec::with_capacity(serial.squat_variants.len());
        for source in &serial.squat_variants {
            squat_variants.push(load_database(load_context, source, &serial.config).await?);
        }

        Ok(MotionMatchingSetup {
            database,
            squat_variants,
            config: serial.config,
        })
    }

    fn extensions(&self) -> &[&str] {
        &["mm.ron"]
    }
}

#[allow(clippy::result_large_err)]
async fn load_database(
    load_context: &mut LoadContext<'_>,
    source: &DatabaseSourceSerial,
    config: &MotionMatchingConfig,
) -> Result<MotionDatabase, AssetLoaderError> {
    let poses: LoadedAsset<PoseSetAsset> = load_context
        .loader()
        .immediate()
        .load(source.poses.clone())
        .await?;
    let poses = poses.get().0.clone();

    let layout = FeatureLayout::new(&config.features, poses.skeleton())?;
    let stored = match load_context
        .loader()
        .immediate()
        .load::<FeatureSetAsset>(source.features.clone())
        .await
    {
        Ok(features) => Some(features.get().0.clone()),
        Err(error) => {
            warn!("Could not load feature set {}: {error}", source.features);
            None
        }
    };

    let features = match stored {
        Some(features) if *features.layout() == layout && features.len() == poses.len() => {
            features
        }
        _ => {
            warn!(
                "Feature set {} does not match the configured features, extracting it again",
                source.features
            );
            Arc::new(
                FeatureSet::extract(&poses, layout)
                    .map_err(motion_matching_core::errors::MotionMatchingError::from)?,
            )
        }
    };

    Ok(MotionDatabase::new(poses, features)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_file_needs_only_the_blobs() {
        let serial: MotionMatchingSetupSerial = ron::de::from_str(
            r#"(
                poses: "motion/walk.poses.mpk",
                features: "motion/walk.features.mpk",
            )"#,
        )
        .unwrap();
        assert!(serial.squat_variants.is_empty());
        assert_eq!(serial.config, MotionMatchingConfig::default());
    }

    #[test]
    fn setup_file_with_variants_and_tuning() {
        let serial: MotionMatchingSetupSerial = ron::de::from_str(
            r#"(
                poses: "walk.poses.mpk",
                features: "walk.features.mpk",
                squat_variants: [(poses: "crouch.poses.mpk", features: "crouch.features.mpk")],
                config: (search_interval: 5, squat: (variant_ratios: [0.7])),
            )"#,
        )
        .unwrap();
        assert_eq!(serial.squat_variants[0].poses, "crouch.poses.mpk");
        assert_eq!(serial.config.search_interval, 5);
        assert!(serial.config.validate().is_ok());
    }
}
