//! Camera and classifier collaborators driven by the poll worker.

use image::RgbaImage;

use crate::camera::{CameraSnapshot, ClassifiedDetection};

/// Passthrough camera access.
pub trait CameraSource: Send + Sync {
    /// Current eye, pose and intrinsics.
    fn snapshot(&self) -> CameraSnapshot;

    /// Copy of the latest camera frame, or `None` while the camera texture
    /// is not ready yet.
    fn capture_still(&self) -> Option<RgbaImage>;
}

/// Object detector run on camera stills.
pub trait ObjectClassifier: Send + Sync {
    /// Detections in normalized, centre-origin image coordinates.
    fn classify(&self, image: &RgbaImage) -> Vec<ClassifiedDetection>;
}
