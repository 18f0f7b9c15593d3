//! Passthrough camera model: eye selection, pinhole intrinsics and the
//! per-poll camera snapshot used to turn normalized image locations into
//! world-space rays.

use nalgebra::{Vector2, Vector3};

use crate::geometry::{CameraPose, Ray};

/// Which passthrough camera produced the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraEye {
    #[default]
    Left,
    Right,
}

/// Pinhole intrinsics in screen pixels (origin lower-left, y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length (fx, fy) in pixels.
    pub focal_length: Vector2<f64>,
    /// Principal point (cx, cy) in pixels.
    pub principal_point: Vector2<f64>,
    /// Sensor resolution (width, height) in pixels.
    pub resolution: (u32, u32),
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, resolution: (u32, u32)) -> Self {
        Self {
            focal_length: Vector2::new(fx, fy),
            principal_point: Vector2::new(cx, cy),
            resolution,
        }
    }

    /// Intrinsics with the principal point at the image centre.
    pub fn centered(focal: f64, resolution: (u32, u32)) -> Self {
        Self::new(
            focal,
            focal,
            resolution.0 as f64 * 0.5,
            resolution.1 as f64 * 0.5,
            resolution,
        )
    }

    /// Camera-space direction through a screen pixel.
    pub fn direction_through_pixel(&self, px: f64, py: f64) -> Vector3<f64> {
        Vector3::new(
            (px - self.principal_point.x) / self.focal_length.x,
            (py - self.principal_point.y) / self.focal_length.y,
            1.0,
        )
    }
}

/// Camera state captured once per poll and held fixed for the whole pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    pub eye: CameraEye,
    pub pose: CameraPose,
    pub intrinsics: CameraIntrinsics,
}

impl CameraSnapshot {
    pub fn new(eye: CameraEye, pose: CameraPose, intrinsics: CameraIntrinsics) -> Self {
        Self {
            eye,
            pose,
            intrinsics,
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.intrinsics.resolution
    }

    /// World-space ray through a normalized image location.
    ///
    /// The normalized location has its origin at the image centre with x, y in
    /// [-0.5, 0.5] and y growing downwards. Screen pixels have their origin in
    /// the lower-left corner, so y is flipped before applying the intrinsics.
    pub fn ray_through(&self, normalized: Vector2<f64>) -> Ray {
        let (width, height) = self.intrinsics.resolution;
        let px = (width as f64 * (0.5 + normalized.x)).round();
        let py = (height as f64 * (0.5 - normalized.y)).round();

        let dir_cam = self.intrinsics.direction_through_pixel(px, py);
        Ray::new(self.pose.position, self.pose.rotate(&dir_cam))
    }
}
