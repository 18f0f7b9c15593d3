//! Interfaces to the camera-side collaborators: the passthrough camera model,
//! classifier detections, depth raycasting and image cropping.

pub mod crop;
pub mod detection;
pub mod model;
pub mod raycast;

pub use crop::{PixelRect, crop_detection, padded_detection_rect};
pub use detection::{ClassifiedDetection, DetectionBatch, prefilter_detections};
pub use model::{CameraEye, CameraIntrinsics, CameraSnapshot};
pub use raycast::{DepthRaycaster, PlaneRaycaster, UnsupportedDepth};
