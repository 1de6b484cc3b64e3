//! Weighted nearest-neighbour search over a [`FeatureSet`].

use crate::{
    errors::ConfigError,
    feature_set::{FeatureLayout, FeatureSet},
};
use rayon::prelude::*;

/// Below this many frames the search stays on the calling thread.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 2048;

/// Per-dimension weights: each feature's weight broadcast over its
/// dimensions, trajectory dimensions scaled by responsiveness and pose
/// dimensions by quality.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureWeights {
    per_dimension: Vec<f32>,
}

impl FeatureWeights {
    pub fn new(layout: &FeatureLayout, responsiveness: f32, quality: f32) -> Self {
        let weights: Vec<f32> = layout.features().iter().map(|f| f.weight).collect();
        Self::expand(layout, &weights, responsiveness, quality)
    }

    /// Uses `weights` (one per feature, in layout order) instead of the
    /// weights stored in the layout.
    pub fn with_feature_weights(
        layout: &FeatureLayout,
        weights: &[f32],
        responsiveness: f32,
        quality: f32,
    ) -> Result<Self, ConfigError> {
        if weights.len() != layout.features().len() {
            return Err(ConfigError::WeightCountMismatch {
                expected: layout.features().len(),
                found: weights.len(),
            });
        }
        Ok(Self::expand(layout, weights, responsiveness, quality))
    }

    fn expand(layout: &FeatureLayout, weights: &[f32], responsiveness: f32, quality: f32) -> Self {
        let mut per_dimension = vec![0.0; layout.size()];
        for (feature, &weight) in layout.features().iter().zip(weights) {
            let scale = if feature.kind.is_trajectory() {
                responsiveness
            } else {
                quality
            };
            per_dimension[feature.offset..feature.offset + feature.dimensions()]
                .fill(weight * scale);
        }
        Self { per_dimension }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.per_dimension
    }
}

/// Distance of the frame playback would continue with, measured over the
/// trajectory dimensions only. Any candidate has to beat it strictly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Continuation {
    pub frame: usize,
    pub distance: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchResult {
    pub frame: usize,
    pub distance: f32,
}

#[derive(Clone, Debug)]
pub struct MotionMatcher {
    weights: FeatureWeights,
    parallel_threshold: usize,
}

impl MotionMatcher {
    pub fn new(weights: FeatureWeights) -> Self {
        Self {
            weights,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }

    pub fn with_parallel_threshold(mut self, frames: usize) -> Self {
        self.parallel_threshold = frames;
        self
    }

    pub fn weights(&self) -> &FeatureWeights {
        &self.weights
    }

    pub fn set_weights(&mut self, weights: FeatureWeights) {
        self.weights = weights;
    }

    /// `None` when `frame` is out of range or invalid.
    pub fn continuation(
        &self,
        features: &FeatureSet,
        query: &[f32],
        frame: usize,
    ) -> Option<Continuation> {
        if !features.is_valid(frame) {
            return None;
        }
        let row = features.feature(frame)?;
        let end = features.pose_offset();
        let distance = weighted_distance(
            &query[..end.min(query.len())],
            &row[..end],
            &self.weights.as_slice()[..end],
        );
        distance.is_finite().then_some(Continuation { frame, distance })
    }

    /// Returns the valid frame with the smallest weighted squared distance to
    /// `query`, ties going to the lowest index. A `continuation` is kept
    /// unless some frame is strictly closer.
    pub fn search(
        &self,
        features: &FeatureSet,
        query: &[f32],
        continuation: Option<Continuation>,
    ) -> Option<SearchResult> {
        let size = features.feature_size();
        let weights = self.weights.as_slice();
        let valid = features.validity();

        let best = if features.len() >= self.parallel_threshold {
            features
                .features()
                .par_chunks(size)
                .enumerate()
                .filter(|(frame, _)| valid[*frame])
                .map(|(frame, row)| SearchResult {
                    frame,
                    distance: weighted_distance(query, row, weights),
                })
                .filter(|result| result.distance.is_finite())
                .reduce_with(closer)
        } else {
            let bound = continuation.map_or(f32::INFINITY, |c| c.distance);
            search_serial(features, query, weights, bound)
        };

        match (best, continuation) {
            (Some(best), Some(continuation)) if best.distance < continuation.distance => {
                Some(best)
            }
            (_, Some(continuation)) => Some(SearchResult {
                frame: continuation.frame,
                distance: continuation.distance,
            }),
            (best, None) => best,
        }
    }
}

fn closer(a: SearchResult, b: SearchResult) -> SearchResult {
    if b.distance < a.distance || (b.distance == a.distance && b.frame < a.frame) {
        b
    } else {
        a
    }
}

/// Frame-ordered scan that stops summing a row once it exceeds the best
/// distance so far.
fn search_serial(
    features: &FeatureSet,
    query: &[f32],
    weights: &[f32],
    bound: f32,
) -> Option<SearchResult> {
    let mut best: Option<SearchResult> = None;
    let mut best_distance = bound;
    for (frame, row) in features.features().chunks_exact(features.feature_size()).enumerate() {
        if !features.is_valid(frame) {
            continue;
        }
        let mut distance = 0.0;
        let mut pruned = false;
        for ((q, x), w) in query.iter().zip(row).zip(weights) {
            let d = q - x;
            distance += w * d * d;
            if distance > best_distance {
                pruned = true;
                break;
            }
        }
        if pruned || !distance.is_finite() {
            continue;
        }
        if best.is_none_or(|b| distance < b.distance) {
            best_distance = best_distance.min(distance);
            best = Some(SearchResult { frame, distance });
        }
    }
    best
}

pub fn weighted_distance(query: &[f32], row: &[f32], weights: &[f32]) -> f32 {
    query
        .iter()
        .zip(row)
        .zip(weights)
        .map(|((q, x), w)| {
            let d = q - x;
            w * d * d
        })
        .sum()
}
