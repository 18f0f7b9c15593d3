//! Camera pose and ray primitives.
//!
//! Poses are stored as camera-to-world transforms. Camera space follows the
//! head-mounted display convention used by the passthrough camera API:
//!
//! ```text
//!        +Y (up)
//!         |
//!         |
//!         +------ +X (right)
//!        /
//!       /
//!      +Z (forward, optical axis)
//! ```

use nalgebra::{Unit, UnitQuaternion, Vector3};

/// Rigid camera pose in world coordinates (camera-to-world).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Optical centre in world frame.
    pub position: Vector3<f64>,
    /// Rotation from camera frame to world frame.
    pub rotation: UnitQuaternion<f64>,
}

impl CameraPose {
    pub fn new(position: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    /// Pose at the world origin looking down +Z.
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Pose at `position` whose optical axis points at `target`.
    ///
    /// Falls back to the identity rotation when `target` coincides with
    /// `position` or is collinear with `up`.
    pub fn looking_at(position: Vector3<f64>, target: Vector3<f64>, up: Vector3<f64>) -> Self {
        let dir = target - position;
        let rotation = if dir.norm() < 1e-12 || dir.cross(&up).norm() < 1e-12 {
            UnitQuaternion::identity()
        } else {
            // face_towards maps +Z onto `dir` and +Y onto the projected `up`.
            UnitQuaternion::face_towards(&dir, &up)
        };
        Self { position, rotation }
    }

    /// World-frame optical axis (camera +Z).
    pub fn forward(&self) -> Vector3<f64> {
        self.rotation * Vector3::z()
    }

    /// World-frame camera up vector (camera +Y).
    pub fn up(&self) -> Vector3<f64> {
        self.rotation * Vector3::y()
    }

    /// World-frame camera right vector (camera +X).
    pub fn right(&self) -> Vector3<f64> {
        self.rotation * Vector3::x()
    }

    /// Transform a direction from camera frame to world frame.
    pub fn rotate(&self, dir_cam: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * dir_cam
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Half-line in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f64>,
    /// Unit direction.
    pub direction: Vector3<f64>,
}

impl Ray {
    /// Build a ray, normalizing `direction`.
    pub fn new(origin: Vector3<f64>, direction: Vector3<f64>) -> Self {
        let norm = direction.norm();
        let direction = if norm > 1e-12 {
            direction / norm
        } else {
            Vector3::z()
        };
        Self { origin, direction }
    }

    /// Point at parameter `t` along the ray.
    pub fn at(&self, t: f64) -> Vector3<f64> {
        self.origin + self.direction * t
    }
}

/// Unsigned angle between two vectors in degrees, 0 if either is degenerate.
pub fn angle_degrees(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    if a.norm() < 1e-12 || b.norm() < 1e-12 {
        return 0.0;
    }
    a.angle(b).to_degrees()
}

/// Rotate `v` by `degrees` about `axis`. Returns `v` unchanged for a zero axis.
pub fn rotate_about(v: &Vector3<f64>, axis: &Vector3<f64>, degrees: f64) -> Vector3<f64> {
    match Unit::try_new(*axis, 1e-12) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, degrees.to_radians()) * v,
        None => *v,
    }
}
