//! Surface samples: one observation of an object's surface from a single
//! camera frame.

use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use nalgebra::{Vector2, Vector3};

/// Camera still or crop shared between samples, events and consumers.
pub type SharedImage = Arc<RgbaImage>;

/// One observation of a surface patch.
///
/// `points` and `is_edge` are parallel: `is_edge[i]` is true when
/// `points[i]` was sampled next to the image frame, meaning the object may
/// extend beyond what the camera saw. The only mutation after construction
/// is pairwise removal of points by the outlier filter.
#[derive(Debug, Clone)]
pub struct TrackSample {
    /// Estimated outward surface normal (opposite of the camera view direction).
    pub normal: Vector3<f64>,
    /// Camera up vector at capture.
    pub up: Vector3<f64>,
    points: Vec<Vector3<f64>>,
    is_edge: Vec<bool>,
    /// Padded crop of the detection.
    pub image: SharedImage,
    pub camera_position: Vector3<f64>,
    timestamp: Instant,
}

impl TrackSample {
    /// Create a sample. Extra entries in the longer of `points` / `is_edge`
    /// are discarded so the two stay parallel.
    pub fn new(
        normal: Vector3<f64>,
        up: Vector3<f64>,
        mut points: Vec<Vector3<f64>>,
        mut is_edge: Vec<bool>,
        image: SharedImage,
        camera_position: Vector3<f64>,
        timestamp: Instant,
    ) -> Self {
        let n = points.len().min(is_edge.len());
        points.truncate(n);
        is_edge.truncate(n);
        Self {
            normal,
            up,
            points,
            is_edge,
            image,
            camera_position,
            timestamp,
        }
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn is_edge(&self) -> &[bool] {
        &self.is_edge
    }

    /// `(point, is_edge)` pairs.
    pub fn iter_points(&self) -> impl Iterator<Item = (Vector3<f64>, bool)> + '_ {
        self.points.iter().copied().zip(self.is_edge.iter().copied())
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn edge_count(&self) -> usize {
        self.is_edge.iter().filter(|&&e| e).count()
    }

    /// Capture time; fixed at construction.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Keep only points for which `keep` returns true, dropping the matching
    /// edge flags. Order is preserved. Returns the number of removed points.
    pub fn retain_points<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&Vector3<f64>) -> bool,
    {
        let before = self.points.len();
        let mut write = 0;
        for read in 0..before {
            if keep(&self.points[read]) {
                self.points.swap(write, read);
                self.is_edge.swap(write, read);
                write += 1;
            }
        }
        self.points.truncate(write);
        self.is_edge.truncate(write);
        before - write
    }

    /// Same observation with a new capture time.
    pub fn restamped(&self, timestamp: Instant) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// Best image of a taxon together with the estimated physical size of the
/// region it shows.
#[derive(Debug, Clone)]
pub struct ImageSampleContext {
    pub image: SharedImage,
    pub normal: Vector3<f64>,
    pub up: Vector3<f64>,
    /// Estimated (width, height) in metres.
    pub size: Vector2<f64>,
}
