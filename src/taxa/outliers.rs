//! RANSAC-style outlier trimming over the pooled points of a taxon.
//!
//! Each pass draws a small random subset of the pooled points, takes its
//! centroid and the RMS distance of the subset to that centroid, and drops
//! every point farther than `sigma_multiplier` times that spread. Passes
//! repeat until nothing is dropped or the iteration cap is reached.
//!
//! The subset is random, so results are not reproducible unless the caller
//! supplies a seeded RNG.

use nalgebra::Vector3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::sample::TrackSample;

/// Parameters of the repeated outlier filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum number of filter passes per admission.
    pub max_iterations: usize,
    /// Points drawn per pass. Filtering only runs with more points than this.
    pub subset_size: usize,
    /// Drop threshold in units of the subset's RMS spread (2.5 ~ 98%).
    pub sigma_multiplier: f64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            subset_size: 5,
            sigma_multiplier: 2.5,
        }
    }
}

/// Run filter passes until one drops nothing. Returns total points dropped.
pub fn filter_outliers_repeated<R: Rng + ?Sized>(
    samples: &mut Vec<TrackSample>,
    params: &RansacParams,
    rng: &mut R,
) -> usize {
    let mut total = 0;
    for _ in 0..params.max_iterations {
        let dropped = filter_outliers_once(samples, params, rng);
        total += dropped;
        if dropped == 0 {
            break;
        }
    }
    total
}

/// Single filter pass. Samples left without points are removed.
pub fn filter_outliers_once<R: Rng + ?Sized>(
    samples: &mut Vec<TrackSample>,
    params: &RansacParams,
    rng: &mut R,
) -> usize {
    let pooled: Vec<Vector3<f64>> = samples
        .iter()
        .flat_map(|s| s.points().iter().copied())
        .collect();

    let subset_size = params.subset_size;
    if subset_size == 0 || pooled.len() <= subset_size {
        return 0;
    }

    let subset = rand::seq::index::sample(rng, pooled.len(), subset_size);
    let centroid = subset
        .iter()
        .fold(Vector3::<f64>::zeros(), |acc, i| acc + pooled[i])
        / subset_size as f64;

    let mean_sq = subset
        .iter()
        .map(|i| (pooled[i] - centroid).norm_squared())
        .sum::<f64>()
        / subset_size as f64;
    let threshold = mean_sq.sqrt() * params.sigma_multiplier;

    // A degenerate subset (all points coincide) says nothing about spread.
    if threshold <= f64::EPSILON {
        return 0;
    }

    let mut dropped = 0;
    for sample in samples.iter_mut() {
        dropped += sample.retain_points(|p| (p - centroid).norm() <= threshold);
    }
    samples.retain(|s| s.point_count() > 0);
    dropped
}
