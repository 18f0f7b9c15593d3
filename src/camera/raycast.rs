//! Depth-backed raycasting against the reconstructed environment surface.

use nalgebra::Vector3;

use crate::geometry::Ray;

/// Environment depth raycaster.
///
/// Implementations wrap the platform depth API. When depth sensing is not
/// available `is_supported` returns false and the projector produces no
/// samples at all.
pub trait DepthRaycaster: Send + Sync {
    /// Whether depth sensing works on this device.
    fn is_supported(&self) -> bool {
        true
    }

    /// First surface hit along `ray` no farther than `max_distance` metres.
    fn raycast(&self, ray: &Ray, max_distance: f64) -> Option<Vector3<f64>>;
}

/// Infinite plane used for simulations and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneRaycaster {
    pub point: Vector3<f64>,
    pub normal: Vector3<f64>,
}

impl PlaneRaycaster {
    pub fn new(point: Vector3<f64>, normal: Vector3<f64>) -> Self {
        Self { point, normal }
    }

    /// Plane `z = depth` facing the origin.
    pub fn at_depth(depth: f64) -> Self {
        Self::new(Vector3::new(0.0, 0.0, depth), -Vector3::z())
    }
}

impl DepthRaycaster for PlaneRaycaster {
    fn raycast(&self, ray: &Ray, max_distance: f64) -> Option<Vector3<f64>> {
        let denom = self.normal.dot(&ray.direction);
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = self.normal.dot(&(self.point - ray.origin)) / denom;
        if t < 0.0 || t > max_distance {
            return None;
        }
        Some(ray.at(t))
    }
}

/// Raycaster for devices without depth support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDepth;

impl DepthRaycaster for UnsupportedDepth {
    fn is_supported(&self) -> bool {
        false
    }

    fn raycast(&self, _ray: &Ray, _max_distance: f64) -> Option<Vector3<f64>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_plane_hit_and_range() {
        let plane = PlaneRaycaster::at_depth(2.0);
        let ray = Ray::new(Vector3::zeros(), Vector3::z());
        let hit = plane.raycast(&ray, 5.0).unwrap();
        assert_relative_eq!(hit, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);

        // Beyond max distance
        assert!(plane.raycast(&ray, 1.5).is_none());

        // Pointing away
        let back = Ray::new(Vector3::zeros(), -Vector3::z());
        assert!(plane.raycast(&back, 5.0).is_none());
    }

    #[test]
    fn test_unsupported_never_hits() {
        let depth = UnsupportedDepth;
        assert!(!depth.is_supported());
        assert!(depth
            .raycast(&Ray::new(Vector3::zeros(), Vector3::z()), 5.0)
            .is_none());
    }
}
