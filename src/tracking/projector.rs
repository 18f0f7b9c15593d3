//! Detection-to-sample projection.
//!
//! A 2D detection rectangle is turned into a handful of world-space points by
//! casting rays through a fixed pattern of image locations inside it:
//!
//! ```text
//!   TL ----- T ----- TR        centre + 4 edge midpoints always,
//!    |               |         corners only for large rectangles.
//!    L       C       R         Positions sit at `sample_extent_factor`
//!    |               |         of the half-size from the centre.
//!   BL ----- B ----- BR
//! ```
//!
//! Each location keeps an edge flag when the rectangle touches the image
//! border on that side, meaning the object may continue outside the frame.

use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;
use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::camera::{CameraSnapshot, ClassifiedDetection, DepthRaycaster, crop_detection};
use crate::taxa::TrackSample;

/// Projection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Rectangles with `width * height` above this also sample the corners.
    pub area_threshold: f64,
    /// Distance to the image border below which a side counts as truncated.
    pub edge_margin: f64,
    /// Raycast range in metres.
    pub max_raycast_distance: f64,
    /// Minimum depth hits needed to keep a detection.
    pub min_hits: usize,
    /// Crop padding as a fraction of the smaller rectangle side.
    pub crop_padding_ratio: f64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            area_threshold: 0.12,
            edge_margin: 0.01,
            max_raycast_distance: 5.0,
            min_hits: 2,
            crop_padding_ratio: 0.10,
        }
    }
}

/// Sides of the rectangle that touch the image border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EdgeFlags {
    pub left: bool,
    pub right: bool,
    pub top: bool,
    pub bottom: bool,
}

impl EdgeFlags {
    /// Flags for a detection in centred normalized coordinates, where the
    /// image spans [-0.5, 0.5] on both axes.
    pub fn of(detection: &ClassifiedDetection, margin: f64) -> Self {
        let half_w = detection.width * 0.5;
        let half_h = detection.height * 0.5;
        let min = -0.5 + margin;
        let max = 0.5 - margin;
        Self {
            left: detection.center_x - half_w < min,
            right: detection.center_x + half_w > max,
            top: detection.center_y - half_h < min,
            bottom: detection.center_y + half_h > max,
        }
    }

    pub fn any(&self) -> bool {
        self.left || self.right || self.top || self.bottom
    }
}

/// Normalized image locations to cast through, with their edge flags.
pub fn sample_pattern(
    detection: &ClassifiedDetection,
    sample_extent_factor: f64,
    config: &ProjectorConfig,
) -> Vec<(Vector2<f64>, bool)> {
    let edges = EdgeFlags::of(detection, config.edge_margin);
    let dx = detection.width * 0.5 * sample_extent_factor;
    let dy = detection.height * 0.5 * sample_extent_factor;
    let c = detection.center();

    let mut pattern = vec![
        (c, false),
        (c + Vector2::new(-dx, 0.0), edges.left),
        (c + Vector2::new(dx, 0.0), edges.right),
        (c + Vector2::new(0.0, -dy), edges.top),
        (c + Vector2::new(0.0, dy), edges.bottom),
    ];

    if detection.area() > config.area_threshold {
        pattern.extend([
            (c + Vector2::new(-dx, -dy), edges.left || edges.top),
            (c + Vector2::new(dx, -dy), edges.right || edges.top),
            (c + Vector2::new(-dx, dy), edges.left || edges.bottom),
            (c + Vector2::new(dx, dy), edges.right || edges.bottom),
        ]);
    }
    pattern
}

/// Turns detections into surface samples against a depth raycaster.
pub struct SampleProjector {
    config: ProjectorConfig,
    sample_extent_factor: f64,
    raycaster: Arc<dyn DepthRaycaster>,
    warned_unsupported: bool,
}

impl SampleProjector {
    pub fn new(
        config: ProjectorConfig,
        sample_extent_factor: f64,
        raycaster: Arc<dyn DepthRaycaster>,
    ) -> Self {
        Self {
            config,
            sample_extent_factor,
            raycaster,
            warned_unsupported: false,
        }
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Project one detection into a sample.
    ///
    /// Returns `None` when depth is unsupported, when fewer than `min_hits`
    /// rays hit a surface, or when the crop would be empty.
    pub fn project(
        &mut self,
        detection: &ClassifiedDetection,
        snapshot: &CameraSnapshot,
        image: &RgbaImage,
        timestamp: Instant,
    ) -> Option<TrackSample> {
        if !self.raycaster.is_supported() {
            if !self.warned_unsupported {
                warn!("depth raycasting unsupported, detections will not be tracked");
                self.warned_unsupported = true;
            }
            return None;
        }

        let pattern = sample_pattern(detection, self.sample_extent_factor, &self.config);
        let mut points: Vec<Vector3<f64>> = Vec::with_capacity(pattern.len());
        let mut is_edge: Vec<bool> = Vec::with_capacity(pattern.len());
        for (location, edge) in pattern {
            let ray = snapshot.ray_through(location);
            if let Some(hit) = self.raycaster.raycast(&ray, self.config.max_raycast_distance) {
                points.push(hit);
                is_edge.push(edge);
            }
        }

        if points.len() < self.config.min_hits {
            debug!(
                class = %detection.class_name,
                hits = points.len(),
                "dropping detection with too few depth hits"
            );
            return None;
        }

        let crop = crop_detection(image, detection, self.config.crop_padding_ratio)?;
        let pose = &snapshot.pose;
        Some(TrackSample::new(
            -pose.forward(),
            pose.up(),
            points,
            is_edge,
            Arc::new(crop),
            pose.position,
            timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::camera::{PlaneRaycaster, UnsupportedDepth};
    use crate::test_support::{detection, origin_snapshot};

    fn projector(raycaster: Arc<dyn DepthRaycaster>) -> SampleProjector {
        SampleProjector::new(ProjectorConfig::default(), 0.5, raycaster)
    }

    #[test]
    fn test_small_box_samples_five_points() {
        let det = detection("cup", 0.0, 0.0, 0.1, 0.1);
        let pattern = sample_pattern(&det, 0.5, &ProjectorConfig::default());
        assert_eq!(pattern.len(), 5);
        assert!(pattern.iter().all(|(_, edge)| !edge));
        assert_relative_eq!(pattern[1].0.x, -0.025);
        assert_relative_eq!(pattern[4].0.y, 0.025);
    }

    #[test]
    fn test_large_box_adds_corners() {
        let det = detection("sofa", 0.0, 0.0, 0.5, 0.5);
        let pattern = sample_pattern(&det, 0.5, &ProjectorConfig::default());
        assert_eq!(pattern.len(), 9);
    }

    #[test]
    fn test_edge_flags_follow_frame_border() {
        // Touches the left border only
        let det = detection("cup", -0.44, 0.0, 0.12, 0.1);
        let flags = EdgeFlags::of(&det, 0.01);
        assert!(flags.left);
        assert!(!flags.right && !flags.top && !flags.bottom);

        let pattern = sample_pattern(&det, 0.5, &ProjectorConfig::default());
        let edges: Vec<bool> = pattern.iter().map(|(_, e)| *e).collect();
        assert_eq!(edges, vec![false, true, false, false, false]);

        // Bottom uses the height, not the width
        let tall = detection("lamp", 0.0, 0.2, 0.05, 0.6);
        let flags = EdgeFlags::of(&tall, 0.01);
        assert!(flags.bottom);
        assert!(!flags.top);
    }

    #[test]
    fn test_corner_flags_combine_sides() {
        let det = detection("table", -0.25, -0.25, 0.5, 0.5);
        let pattern = sample_pattern(&det, 0.5, &ProjectorConfig::default());
        let edges: Vec<bool> = pattern.iter().map(|(_, e)| *e).collect();
        // C, L, R, T, B, TL, TR, BL, BR
        assert_eq!(
            edges,
            vec![false, true, false, true, false, true, true, true, false]
        );
    }

    #[test]
    fn test_project_against_plane() {
        let mut proj = projector(Arc::new(PlaneRaycaster::at_depth(1.0)));
        let image = RgbaImage::new(1000, 1000);
        let det = detection("cup", 0.0, 0.0, 0.1, 0.1);
        let sample = proj
            .project(&det, &origin_snapshot(), &image, Instant::now())
            .unwrap();

        assert_eq!(sample.point_count(), 5);
        for p in sample.points() {
            assert_relative_eq!(p.z, 1.0, epsilon = 1e-9);
            assert!((p - Vector3::new(0.0, 0.0, 1.0)).norm() < 0.02);
        }
        assert_relative_eq!(sample.normal, -Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(sample.up, Vector3::y(), epsilon = 1e-12);
        // 100 px box + 10 px padding per side
        assert_eq!(sample.image.dimensions(), (120, 120));
    }

    #[test]
    fn test_unsupported_depth_yields_nothing() {
        let mut proj = projector(Arc::new(UnsupportedDepth));
        let image = RgbaImage::new(100, 100);
        let det = detection("cup", 0.0, 0.0, 0.1, 0.1);
        assert!(proj
            .project(&det, &origin_snapshot(), &image, Instant::now())
            .is_none());
    }

    #[test]
    fn test_too_few_hits_dropped() {
        // Plane beyond the raycast range
        let mut proj = projector(Arc::new(PlaneRaycaster::at_depth(10.0)));
        let image = RgbaImage::new(100, 100);
        let det = detection("cup", 0.0, 0.0, 0.1, 0.1);
        assert!(proj
            .project(&det, &origin_snapshot(), &image, Instant::now())
            .is_none());
    }
}
