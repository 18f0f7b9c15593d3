//! Classifier output: normalized 2D detections and the per-frame batch that
//! carries them together with the source image and camera snapshot.

use std::collections::VecDeque;
use std::sync::Arc;

use image::RgbaImage;
use nalgebra::Vector2;
use tracing::debug;

use super::model::CameraSnapshot;

/// Diagonal fraction within which two same-class rectangles are duplicates.
const OVERLAP_DIAGONAL_RATIO: f64 = 0.5;

/// One classified object rectangle.
///
/// Coordinates are normalized to the image: `center_x`/`center_y` in
/// [-0.5, 0.5] measured from the image centre (y grows downwards),
/// `width`/`height` in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedDetection {
    pub class_name: String,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClassifiedDetection {
    pub fn new(
        class_name: impl Into<String>,
        center_x: f64,
        center_y: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            center_x,
            center_y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Vector2<f64> {
        Vector2::new(self.center_x, self.center_y)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// All coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.center_x.is_finite()
            && self.center_y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    fn diagonal(&self) -> f64 {
        (self.width * self.width + self.height * self.height).sqrt()
    }

    /// Whether two rectangles are the same object seen twice in one frame.
    ///
    /// Requires equal class names and a centre distance below half the
    /// diagonal of either rectangle.
    pub fn overlaps(&self, other: &ClassifiedDetection) -> bool {
        if self.class_name != other.class_name {
            return false;
        }
        let distance = (self.center() - other.center()).norm();
        distance < self.diagonal() * OVERLAP_DIAGONAL_RATIO
            || distance < other.diagonal() * OVERLAP_DIAGONAL_RATIO
    }

    /// Average of two rectangles, keeping this rectangle's class name.
    pub fn merge_average(&self, other: &ClassifiedDetection) -> ClassifiedDetection {
        ClassifiedDetection {
            class_name: self.class_name.clone(),
            center_x: (self.center_x + other.center_x) * 0.5,
            center_y: (self.center_y + other.center_y) * 0.5,
            width: (self.width + other.width) * 0.5,
            height: (self.height + other.height) * 0.5,
        }
    }
}

/// All detections found in one camera still.
#[derive(Debug, Clone)]
pub struct DetectionBatch {
    /// Camera state at capture time.
    pub snapshot: CameraSnapshot,
    /// Full camera still the detections refer to.
    pub image: Arc<RgbaImage>,
    pub detections: Vec<ClassifiedDetection>,
}

impl DetectionBatch {
    pub fn new(
        snapshot: CameraSnapshot,
        image: Arc<RgbaImage>,
        detections: Vec<ClassifiedDetection>,
    ) -> Self {
        Self {
            snapshot,
            image,
            detections,
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Drop ignored classes and malformed rectangles, then optionally fold
/// overlapping duplicates.
///
/// Duplicates are merged greedily: a merged rectangle goes back into the
/// queue so it can absorb further overlaps. Every merge removes one
/// rectangle, so the loop terminates.
pub fn prefilter_detections(
    detections: Vec<ClassifiedDetection>,
    ignored_classes: &[String],
    merge_overlapping: bool,
) -> Vec<ClassifiedDetection> {
    let received = detections.len();
    let mut queue: VecDeque<ClassifiedDetection> = detections
        .into_iter()
        .filter(|d| d.is_finite())
        .filter(|d| !ignored_classes.iter().any(|c| c == &d.class_name))
        .collect();

    if !merge_overlapping {
        return queue.into_iter().collect();
    }

    let mut processed: Vec<ClassifiedDetection> = Vec::with_capacity(queue.len());
    let mut merges = 0usize;
    while let Some(putative) = queue.pop_front() {
        match processed.iter().position(|existing| existing.overlaps(&putative)) {
            Some(i) => {
                let existing = processed.remove(i);
                queue.push_back(existing.merge_average(&putative));
                merges += 1;
            }
            None => processed.push(putative),
        }
    }

    if merges > 0 || processed.len() != received {
        debug!(
            received,
            kept = processed.len(),
            merges,
            "prefiltered detections"
        );
    }
    processed
}
