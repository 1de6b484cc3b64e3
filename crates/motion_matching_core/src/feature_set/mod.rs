mod extraction;
mod layout;
mod serial;

pub use layout::*;
pub use serial::*;

use crate::errors::FeatureSetError;

/// Per-dimension normalization statistics.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct FeatureStats {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

/// One normalized feature vector and one validity flag per pose set frame.
///
/// Vectors are stored row-major in one flat buffer, `layout.size()` values per
/// frame, normalized with [`FeatureSet::stats`].
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSet {
    layout: FeatureLayout,
    features: Vec<f32>,
    valid: Vec<bool>,
    stats: FeatureStats,
}

impl FeatureSet {
    /// Wraps raw (not yet normalized) feature vectors and normalizes them.
    pub fn from_raw(
        layout: FeatureLayout,
        features: Vec<f32>,
        valid: Vec<bool>,
    ) -> Result<Self, FeatureSetError> {
        let expected = valid.len() * layout.size();
        if features.len() != expected {
            return Err(FeatureSetError::SizeMismatch {
                expected,
                found: features.len(),
            });
        }
        let stats = compute_stats(&layout, &features, &valid)?;
        let mut set = Self {
            layout,
            features,
            valid,
            stats,
        };
        set.normalize();
        Ok(set)
    }

    /// Reassembles a set whose features are already normalized with `stats`.
    pub fn from_normalized(
        layout: FeatureLayout,
        stats: FeatureStats,
        features: Vec<f32>,
        valid: Vec<bool>,
    ) -> Result<Self, FeatureSetError> {
        let size = layout.size();
        for found in [stats.mean.len(), stats.std.len()] {
            if found != size {
                return Err(FeatureSetError::SizeMismatch {
                    expected: size,
                    found,
                });
            }
        }
        if let Some(dimension) = stats.std.iter().position(|&std| !(std > 0.0)) {
            return Err(FeatureSetError::ZeroVariance { dimension });
        }
        let expected = valid.len() * size;
        if features.len() != expected {
            return Err(FeatureSetError::SizeMismatch {
                expected,
                found: features.len(),
            });
        }
        Ok(Self {
            layout,
            features,
            valid,
            stats,
        })
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn stats(&self) -> &FeatureStats {
        &self.stats
    }

    pub fn feature_size(&self) -> usize {
        self.layout.size()
    }

    pub fn pose_offset(&self) -> usize {
        self.layout.pose_offset()
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    /// Normalized vector of `frame`.
    pub fn feature(&self, frame: usize) -> Option<&[f32]> {
        let size = self.feature_size();
        self.features.get(frame * size..(frame + 1) * size)
    }

    /// Whole normalized matrix, one row per frame.
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn is_valid(&self, frame: usize) -> bool {
        self.valid.get(frame).copied().unwrap_or(false)
    }

    pub fn validity(&self) -> &[bool] {
        &self.valid
    }

    pub fn first_valid_frame(&self) -> Option<usize> {
        self.valid.iter().position(|&valid| valid)
    }

    /// `(x - mean) / std` for every dimension of `vector`.
    pub fn normalize_vector(&self, vector: &mut [f32]) {
        for ((value, mean), std) in vector.iter_mut().zip(&self.stats.mean).zip(&self.stats.std) {
            *value = (*value - mean) / std;
        }
    }

    pub fn denormalize_vector(&self, vector: &mut [f32]) {
        for ((value, mean), std) in vector.iter_mut().zip(&self.stats.mean).zip(&self.stats.std) {
            *value = *value * std + mean;
        }
    }

    /// Normalizes only the trajectory part of `vector`.
    pub fn normalize_trajectory(&self, vector: &mut [f32]) {
        let end = self.pose_offset().min(vector.len());
        self.normalize_vector(&mut vector[..end]);
    }

    pub fn denormalized_feature(&self, frame: usize) -> Option<Vec<f32>> {
        let mut vector = self.feature(frame)?.to_vec();
        self.denormalize_vector(&mut vector);
        Some(vector)
    }

    pub fn normalize(&mut self) {
        let size = self.feature_size();
        let stats = &self.stats;
        for row in self.features.chunks_exact_mut(size) {
            for ((value, mean), std) in row.iter_mut().zip(&stats.mean).zip(&stats.std) {
                *value = (*value - mean) / std;
            }
        }
    }

    pub fn denormalize(&mut self) {
        let size = self.feature_size();
        let stats = &self.stats;
        for row in self.features.chunks_exact_mut(size) {
            for ((value, mean), std) in row.iter_mut().zip(&stats.mean).zip(&stats.std) {
                *value = *value * std + mean;
            }
        }
    }

    /// Denormalizes everything, recomputes the statistics over the valid
    /// frames and normalizes again. On error the set is left normalized with
    /// its previous statistics.
    pub fn renormalize(&mut self) -> Result<(), FeatureSetError> {
        self.denormalize();
        match compute_stats(&self.layout, &self.features, &self.valid) {
            Ok(stats) => {
                self.stats = stats;
                self.normalize();
                Ok(())
            }
            Err(err) => {
                self.normalize();
                Err(err)
            }
        }
    }
}

/// Mean and population standard deviation of every dimension over the valid
/// frames, accumulated in `f64`.
fn compute_stats(
    layout: &FeatureLayout,
    features: &[f32],
    valid: &[bool],
) -> Result<FeatureStats, FeatureSetError> {
    let size = layout.size();
    let mut sum = vec![0.0f64; size];
    let mut count = 0usize;
    for (row, _) in features
        .chunks_exact(size)
        .zip(valid)
        .filter(|(_, valid)| **valid)
    {
        for (acc, &value) in sum.iter_mut().zip(row) {
            *acc += value as f64;
        }
        count += 1;
    }
    if count == 0 {
        return Err(FeatureSetError::NoValidFrames);
    }
    let mean: Vec<f64> = sum.iter().map(|s| s / count as f64).collect();

    let mut sq = vec![0.0f64; size];
    for (row, _) in features
        .chunks_exact(size)
        .zip(valid)
        .filter(|(_, valid)| **valid)
    {
        for ((acc, &value), m) in sq.iter_mut().zip(row).zip(&mean) {
            let d = value as f64 - m;
            *acc += d * d;
        }
    }

    let mut std = Vec::with_capacity(size);
    for (dimension, acc) in sq.iter().enumerate() {
        let s = (acc / count as f64).sqrt() as f32;
        if !(s > f32::EPSILON) {
            return Err(FeatureSetError::ZeroVariance { dimension });
        }
        std.push(s);
    }

    Ok(FeatureStats {
        mean: mean.into_iter().map(|m| m as f32).collect(),
        std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn normalization_roundtrip() {
        let set = testing::walk_feature_set(200);
        let raw = set.denormalized_feature(37).unwrap();
        let mut again = raw.clone();
        set.normalize_vector(&mut again);
        set.denormalize_vector(&mut again);
        for (a, b) in raw.iter().zip(&again) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn normalized_valid_frames_are_standardized() {
        let set = testing::walk_feature_set(200);
        let size = set.feature_size();
        let valid: Vec<&[f32]> = (0..set.len())
            .filter(|&frame| set.is_valid(frame))
            .filter_map(|frame| set.feature(frame))
            .collect();
        for dimension in 0..size {
            let mean: f32 =
                valid.iter().map(|row| row[dimension]).sum::<f32>() / valid.len() as f32;
            assert!(mean.abs() < 1e-3, "dimension {dimension} mean {mean}");
        }
    }

    #[test]
    fn renormalize_is_stable() {
        let mut set = testing::walk_feature_set(120);
        let before = set.features().to_vec();
        set.renormalize().unwrap();
        for (a, b) in before.iter().zip(set.features()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn constant_dimension_is_fatal() {
        let layout = testing::walk_feature_set(120).layout().clone();
        let size = layout.size();
        let mut features: Vec<f32> = (0..10 * size).map(|i| i as f32).collect();
        for row in features.chunks_exact_mut(size) {
            row[3] = 1.5;
        }
        assert_eq!(
            FeatureSet::from_raw(layout, features, vec![true; 10]),
            Err(FeatureSetError::ZeroVariance { dimension: 3 })
        );
    }

    #[test]
    fn no_valid_frames_is_fatal() {
        let layout = testing::walk_feature_set(120).layout().clone();
        let features = vec![0.0; 4 * layout.size()];
        assert_eq!(
            FeatureSet::from_raw(layout, features, vec![false; 4]),
            Err(FeatureSetError::NoValidFrames)
        );
    }
}
