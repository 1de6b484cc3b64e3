use crate::{
    errors::{DatasetError, MotionMatchingResult, PersistenceError},
    feature_set::{FeatureDescriptor, FeatureLayout, FeatureSet},
    pose_set::PoseSet,
};
use bevy::log::{info, warn};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// Where the two blobs of a database live on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabasePaths {
    pub poses: PathBuf,
    pub features: PathBuf,
}

impl DatabasePaths {
    /// `<dir>/<name>.poses.mpk` and `<dir>/<name>.features.mpk`.
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            poses: dir.join(format!("{name}.poses.mpk")),
            features: dir.join(format!("{name}.features.mpk")),
        }
    }
}

/// A pose set and the feature set extracted from it, shared between every
/// character that plays them.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionDatabase {
    poses: Arc<PoseSet>,
    features: Arc<FeatureSet>,
}

impl MotionDatabase {
    pub fn new(poses: Arc<PoseSet>, features: Arc<FeatureSet>) -> MotionMatchingResult<Self> {
        if poses.len() != features.len() {
            return Err(DatasetError::FrameCountMismatch {
                poses: poses.len(),
                features: features.len(),
            }
            .into());
        }
        Ok(Self { poses, features })
    }

    /// Extracts the features described by `descriptors` from `poses`.
    pub fn build(poses: PoseSet, descriptors: &[FeatureDescriptor]) -> MotionMatchingResult<Self> {
        let layout = FeatureLayout::new(descriptors, poses.skeleton())?;
        let features = FeatureSet::extract(&poses, layout)?;
        Self::new(Arc::new(poses), Arc::new(features))
    }

    pub fn poses(&self) -> &Arc<PoseSet> {
        &self.poses
    }

    pub fn features(&self) -> &Arc<FeatureSet> {
        &self.features
    }

    pub fn save(&self, paths: &DatabasePaths) -> Result<(), PersistenceError> {
        write_file(&paths.poses, |writer| self.poses.write_to(writer))?;
        write_file(&paths.features, |writer| self.features.write_to(writer))?;
        Ok(())
    }

    pub fn load(paths: &DatabasePaths) -> MotionMatchingResult<Self> {
        let poses = read_file(&paths.poses, PoseSet::read_from)?;
        let features = read_file(&paths.features, FeatureSet::read_from)?;
        Self::new(Arc::new(poses), Arc::new(features))
    }

    /// Loads both blobs, regenerating whatever is missing, unreadable or
    /// extracted with a different layout. `rebuild` re-imports the pose set
    /// from its source clips; its failure is fatal. Regenerated blobs are
    /// written back, failing to write them is only logged.
    pub fn load_or_build(
        paths: &DatabasePaths,
        descriptors: &[FeatureDescriptor],
        rebuild: impl FnOnce() -> MotionMatchingResult<PoseSet>,
    ) -> MotionMatchingResult<Self> {
        let poses = match read_file(&paths.poses, PoseSet::read_from) {
            Ok(poses) => poses,
            Err(error) => {
                warn!(
                    "Could not load pose set {}: {error}, importing it again",
                    paths.poses.display()
                );
                let poses = rebuild()?;
                if let Err(error) = write_file(&paths.poses, |writer| poses.write_to(writer)) {
                    warn!("Could not save pose set {}: {error}", paths.poses.display());
                }
                poses
            }
        };

        let layout = FeatureLayout::new(descriptors, poses.skeleton())?;
        let stored = read_file(&paths.features, |reader| {
            let summary = FeatureSet::read_summary(&mut *reader)?;
            if summary.layout != layout {
                return Err(PersistenceError::Corrupt(
                    "stored feature layout differs from the configured one".into(),
                ));
            }
            if summary.header.frame_count != poses.len() as u64 {
                return Err(PersistenceError::Corrupt(format!(
                    "stored features cover {} frames, the pose set has {}",
                    summary.header.frame_count,
                    poses.len()
                )));
            }
            Ok(())
        })
        .and_then(|()| read_file(&paths.features, FeatureSet::read_from));

        let features = match stored {
            Ok(features) => features,
            Err(error) => {
                warn!(
                    "Could not use feature set {}: {error}, extracting it again",
                    paths.features.display()
                );
                let features = FeatureSet::extract(&poses, layout)?;
                if let Err(error) =
                    write_file(&paths.features, |writer| features.write_to(writer))
                {
                    warn!(
                        "Could not save feature set {}: {error}",
                        paths.features.display()
                    );
                }
                features
            }
        };

        info!(
            "Motion database ready: {} frames, {} feature dimensions",
            poses.len(),
            features.feature_size()
        );
        Self::new(Arc::new(poses), Arc::new(features))
    }
}

fn read_file<T>(
    path: &Path,
    read: impl FnOnce(&mut BufReader<File>) -> Result<T, PersistenceError>,
) -> Result<T, PersistenceError> {
    let mut reader = BufReader::new(File::open(path)?);
    read(&mut reader)
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<(), PersistenceError>,
) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer)?;
    writer.flush()?;
    Ok(())
}
