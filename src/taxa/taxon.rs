//! CameraTrackedTaxon - one persistently tracked real-world object.
//!
//! A taxon owns a bounded, append-ordered history of surface samples for a
//! single classifier label. Centre and extent are derived from the pooled
//! sample points and recomputed after every change to the sample set.
//! Observe/miss counters drive a reliability score and the removal policy.

use std::time::{Duration, Instant};

use nalgebra::{Vector2, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::{angle_degrees, rotate_about};

use super::outliers::{RansacParams, filter_outliers_repeated};
use super::sample::{ImageSampleContext, TrackSample};

/// Per-taxon tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonConfig {
    /// Fewer retained points than this and the taxon is removed.
    pub min_point_count: usize,
    /// Floor for every extent axis in metres (5 cm).
    pub min_extent: f64,
    /// Samples kept per taxon; oldest are evicted first.
    pub max_sample_count: usize,
    /// Consecutive "should have seen it" misses tolerated before removal.
    pub max_miss_count: u32,
    /// Seconds after the newest sample at which the taxon is stale.
    pub max_sample_age_secs: f64,
    /// Half-angle of the cone in which the object counts as visible.
    pub visibility_max_angle_degrees: f64,
    /// Closer than this the classifier is unlikely to recognize the object.
    pub visibility_min_distance: f64,
    /// Farther than this the classifier is unlikely to recognize the object.
    pub visibility_max_distance: f64,
    /// Merge reach as a fraction of the extent diagonal for fully framed taxa.
    pub margin_ratio_closed: f64,
    /// Merge reach for taxa joining at a frame-truncated (open) edge.
    pub margin_ratio_open: f64,
    /// Fraction of the detection half-size used for sample placement.
    /// 1 samples the rectangle edge, 0 only the centre.
    pub sample_extent_factor: f64,
    pub ransac: RansacParams,
}

impl Default for TaxonConfig {
    fn default() -> Self {
        Self {
            min_point_count: 4,
            min_extent: 0.05,
            max_sample_count: 10,
            max_miss_count: 5,
            max_sample_age_secs: 300.0,
            visibility_max_angle_degrees: 35.0,
            visibility_min_distance: 0.5,
            visibility_max_distance: 2.0,
            margin_ratio_closed: 0.5,
            margin_ratio_open: 1.5,
            sample_extent_factor: 0.5,
            ransac: RansacParams::default(),
        }
    }
}

impl TaxonConfig {
    /// Whether a sample `age` old is past the staleness window. An infinite
    /// window never expires.
    pub fn is_stale(&self, age: Duration) -> bool {
        age.as_secs_f64() > self.max_sample_age_secs
    }
}

/// Why a taxon should leave the tracked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Too few points to estimate centre and extent.
    TooFewPoints,
    /// Newest sample is older than the staleness window.
    Stale,
    /// Should have been visible but was missed too often.
    Missed,
}

/// A persistently tracked object.
#[derive(Debug, Clone)]
pub struct CameraTrackedTaxon {
    name: String,
    samples: Vec<TrackSample>,
    center: Vector3<f64>,
    extent: Vector3<f64>,
    /// Passes in a row in which the taxon was re-observed.
    observe_count: u32,
    /// Passes in a row in which the taxon should have been seen but was not.
    miss_count: u32,
    config: TaxonConfig,
}

impl CameraTrackedTaxon {
    /// Empty taxon for `name`. Add samples before using derived values.
    pub fn new(name: impl Into<String>, config: TaxonConfig) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
            center: Vector3::zeros(),
            extent: Vector3::repeat(config.min_extent),
            observe_count: 0,
            miss_count: 0,
            config,
        }
    }

    /// Taxon seeded with `samples`, filtered and derived.
    pub fn with_samples<R: Rng + ?Sized>(
        name: impl Into<String>,
        samples: Vec<TrackSample>,
        config: TaxonConfig,
        rng: &mut R,
    ) -> Self {
        let mut taxon = Self::new(name, config);
        taxon.add_samples_with_rng(samples, rng);
        taxon
    }

    /// Classifier label; taxa only ever merge with the same label.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    /// Half-size per world axis, each at least `min_extent`.
    pub fn extent(&self) -> Vector3<f64> {
        self.extent
    }

    pub fn observe_count(&self) -> u32 {
        self.observe_count
    }

    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    pub fn config(&self) -> &TaxonConfig {
        &self.config
    }

    pub fn samples(&self) -> &[TrackSample] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Total retained points across all samples.
    pub fn point_count(&self) -> usize {
        self.samples.iter().map(|s| s.point_count()).sum()
    }

    /// All `(point, is_edge)` pairs, oldest sample first.
    pub fn sample_points(&self) -> Vec<(Vector3<f64>, bool)> {
        self.samples.iter().flat_map(|s| s.iter_points()).collect()
    }

    /// One normal per sample.
    pub fn sample_normals(&self) -> Vec<Vector3<f64>> {
        self.samples.iter().map(|s| s.normal).collect()
    }

    pub fn oldest_timestamp(&self) -> Option<Instant> {
        self.samples.iter().map(|s| s.timestamp()).min()
    }

    pub fn newest_timestamp(&self) -> Option<Instant> {
        self.samples.iter().map(|s| s.timestamp()).max()
    }

    /// Confidence in [0, 1] from the observe/miss history.
    ///
    /// Step function: any repeated miss drops to 0, a fresh or once-missed
    /// taxon sits at 0.1, one confirmed observation gives 0.3 and from then
    /// on `1 - 1/observe_count` (2 -> 0.5, 3 -> 0.67, 4 -> 0.75, ...).
    pub fn reliability(&self) -> f64 {
        if self.miss_count > 1 {
            return 0.0;
        }
        if self.miss_count <= 1 && self.observe_count == 0 {
            return 0.1;
        }
        if self.observe_count == 0 {
            return 0.2;
        }
        if self.observe_count == 1 {
            return 0.3;
        }
        1.0 - 1.0 / self.observe_count as f64
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sample admission
    // ─────────────────────────────────────────────────────────────────────────

    /// Append samples using the thread-local RNG for outlier filtering.
    pub fn add_samples(&mut self, samples: Vec<TrackSample>) {
        self.add_samples_with_rng(samples, &mut rand::thread_rng());
    }

    /// Append samples, trim outliers, evict the oldest beyond the cap and
    /// re-derive centre and extent.
    pub fn add_samples_with_rng<R: Rng + ?Sized>(
        &mut self,
        samples: Vec<TrackSample>,
        rng: &mut R,
    ) {
        self.samples.extend(samples);

        filter_outliers_repeated(&mut self.samples, &self.config.ransac, rng);

        // Append order, not timestamp order
        if self.samples.len() > self.config.max_sample_count {
            let excess = self.samples.len() - self.config.max_sample_count;
            self.samples.drain(..excess);
        }

        self.recompute_derived();
    }

    /// Replace the whole sample set.
    pub fn set_samples_with_rng<R: Rng + ?Sized>(
        &mut self,
        samples: Vec<TrackSample>,
        rng: &mut R,
    ) {
        self.samples.clear();
        self.add_samples_with_rng(samples, rng);
    }

    /// Hand the samples out, leaving the taxon empty.
    pub(crate) fn take_samples(&mut self) -> Vec<TrackSample> {
        std::mem::take(&mut self.samples)
    }

    fn recompute_derived(&mut self) {
        let count = self.point_count();
        if count == 0 {
            self.center = Vector3::zeros();
            self.extent = Vector3::repeat(self.config.min_extent);
            return;
        }

        let center = self
            .samples
            .iter()
            .flat_map(|s| s.points().iter())
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p)
            / count as f64;

        let mut mean_abs: Vector3<f64> = Vector3::zeros();
        let mut max_abs: Vector3<f64> = Vector3::zeros();
        for p in self.samples.iter().flat_map(|s| s.points().iter()) {
            let d = (p - center).abs();
            mean_abs += d;
            max_abs = max_abs.sup(&d);
        }
        mean_abs /= count as f64;

        let min_extent = self.config.min_extent;
        self.center = center;
        self.extent = ((mean_abs + max_abs) * 0.5).map(|v| v.max(min_extent));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the object lies where the camera should have recognized it.
    pub fn should_be_visible(
        &self,
        camera_position: &Vector3<f64>,
        camera_forward: &Vector3<f64>,
    ) -> bool {
        let to_center = self.center - camera_position;
        if angle_degrees(camera_forward, &to_center) >= self.config.visibility_max_angle_degrees {
            return false;
        }
        let distance = to_center.norm();
        distance >= self.config.visibility_min_distance
            && distance <= self.config.visibility_max_distance
    }

    /// Update observe/miss counters once per fusion pass.
    ///
    /// A sample at or after `observed_at` means the taxon was seen this pass.
    /// Otherwise a miss is only counted when the taxon should clearly have
    /// been visible; anything else leaves the counters alone.
    pub fn note_camera_observation(
        &mut self,
        observed_at: Instant,
        camera_position: &Vector3<f64>,
        camera_forward: &Vector3<f64>,
    ) {
        let seen = self.newest_timestamp().is_some_and(|t| t >= observed_at);
        if seen {
            self.observe_count += 1;
            self.miss_count = 0;
        } else if self.should_be_visible(camera_position, camera_forward) {
            self.miss_count += 1;
            self.observe_count = 0;
        }
    }

    /// First removal criterion that applies at `now`, if any.
    pub fn removal_reason(&self, now: Instant) -> Option<RemovalReason> {
        if self.point_count() < self.config.min_point_count {
            return Some(RemovalReason::TooFewPoints);
        }
        let stale = match self.newest_timestamp() {
            Some(newest) => self.config.is_stale(now.saturating_duration_since(newest)),
            None => true,
        };
        if stale {
            return Some(RemovalReason::Stale);
        }
        if self.miss_count > self.config.max_miss_count {
            return Some(RemovalReason::Missed);
        }
        None
    }

    pub fn should_remove(&self, now: Instant) -> bool {
        self.removal_reason(now).is_some()
    }

    /// Independent copy with re-stamped samples and fresh counters.
    pub fn untracked_copy(&self, now: Instant) -> Self {
        let samples = self.samples.iter().map(|s| s.restamped(now)).collect();
        let mut copy = Self::new(self.name.clone(), self.config);
        copy.samples = samples;
        copy.recompute_derived();
        copy
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Representative image
    // ─────────────────────────────────────────────────────────────────────────

    /// Best image with no viewing preference.
    pub fn image_context(&self) -> Option<ImageSampleContext> {
        self.representative_image(None)
    }

    /// Pick the most fully framed sample image and estimate its physical size.
    ///
    /// Samples with the fewest edge points win. Among equally framed samples,
    /// a `reference_forward` direction prefers the sample whose normal differs
    /// most from it; without one the first sample wins.
    pub fn representative_image(
        &self,
        reference_forward: Option<&Vector3<f64>>,
    ) -> Option<ImageSampleContext> {
        let mut best: Option<(&TrackSample, usize, f64)> = None;
        for sample in &self.samples {
            let edges = sample.edge_count();
            let angle = reference_forward
                .map(|f| angle_degrees(f, &sample.normal))
                .unwrap_or(0.0);
            let better = match best {
                None => true,
                Some((_, best_edges, best_angle)) => {
                    let wider = reference_forward.is_some() && angle > best_angle;
                    edges < best_edges || (edges == best_edges && wider)
                }
            };
            if better {
                best = Some((sample, edges, angle));
            }
        }
        let (chosen, _, _) = best?;

        let up = chosen.up;
        let right = rotate_about(&up, &chosen.normal, 90.0);

        let count = self.point_count();
        if count == 0 {
            return None;
        }
        let (sum_up, sum_right) = self
            .samples
            .iter()
            .flat_map(|s| s.points().iter())
            .fold((0.0, 0.0), |(u, r), p| {
                let dir = p - self.center;
                (u + dir.dot(&up).abs(), r + dir.dot(&right).abs())
            });
        let average_y = sum_up / count as f64;
        let average_x = sum_right / count as f64;

        let (img_w, img_h) = chosen.image.dimensions();
        let width_over_height = if img_h > 0 {
            img_w as f64 / img_h as f64
        } else {
            1.0
        };

        // Two estimates per axis, one from the image aspect ratio.
        let width_from_height = average_y * width_over_height;
        let height_from_width = if width_over_height > 0.0 {
            average_x / width_over_height
        } else {
            average_y
        };
        let scale_x = (average_x + width_from_height) * 0.5;
        let scale_y = (average_y + height_from_width) * 0.5;

        // Mean deviation covers roughly half the object, and samples only
        // reach `sample_extent_factor` of the rectangle.
        let additional = if self.config.sample_extent_factor > 0.0 {
            2.0 / self.config.sample_extent_factor
        } else {
            2.0
        };

        Some(ImageSampleContext {
            image: chosen.image.clone(),
            normal: chosen.normal,
            up,
            size: Vector2::new(scale_x * additional, scale_y * additional),
        })
    }
}
