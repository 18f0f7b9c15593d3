//! Fixtures shared by unit tests: a fixed camera, a scripted classifier and
//! detection builders.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use image::RgbaImage;
use nalgebra::Vector3;
use parking_lot::Mutex;

use crate::camera::{
    CameraEye, CameraIntrinsics, CameraSnapshot, ClassifiedDetection, DetectionBatch,
};
use crate::geometry::CameraPose;
use crate::system::{CameraSource, ObjectClassifier};

/// Side length of test stills in pixels.
pub const IMAGE_SIZE: u32 = 1000;

/// Focal length chosen so a 0.1-wide box at 1 m spans 5 cm.
pub const FOCAL_PX: f64 = 2000.0;

pub fn detection(class: &str, cx: f64, cy: f64, w: f64, h: f64) -> ClassifiedDetection {
    ClassifiedDetection::new(class, cx, cy, w, h)
}

pub fn snapshot_at(pose: CameraPose) -> CameraSnapshot {
    CameraSnapshot::new(
        CameraEye::Left,
        pose,
        CameraIntrinsics::centered(FOCAL_PX, (IMAGE_SIZE, IMAGE_SIZE)),
    )
}

/// Camera at the origin looking down +Z.
pub fn origin_snapshot() -> CameraSnapshot {
    snapshot_at(CameraPose::identity())
}

/// Camera moved along X, still looking down +Z.
pub fn shifted_snapshot(x: f64) -> CameraSnapshot {
    snapshot_at(CameraPose {
        position: Vector3::new(x, 0.0, 0.0),
        ..CameraPose::identity()
    })
}

pub fn batch_at(snapshot: CameraSnapshot, detections: Vec<ClassifiedDetection>) -> DetectionBatch {
    DetectionBatch::new(
        snapshot,
        Arc::new(RgbaImage::new(IMAGE_SIZE, IMAGE_SIZE)),
        detections,
    )
}

/// Camera that is not ready for the first `not_ready` captures.
pub struct FixedCamera {
    snapshot: CameraSnapshot,
    not_ready: AtomicU32,
}

impl FixedCamera {
    pub fn ready() -> Self {
        Self::ready_after(0)
    }

    pub fn ready_after(not_ready: u32) -> Self {
        Self {
            snapshot: origin_snapshot(),
            not_ready: AtomicU32::new(not_ready),
        }
    }
}

impl CameraSource for FixedCamera {
    fn snapshot(&self) -> CameraSnapshot {
        self.snapshot
    }

    fn capture_still(&self) -> Option<RgbaImage> {
        let pending = self
            .not_ready
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match pending {
            Ok(_) => None,
            Err(_) => Some(RgbaImage::new(IMAGE_SIZE, IMAGE_SIZE)),
        }
    }
}

/// Classifier replaying scripted results, repeating the last one forever.
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Vec<ClassifiedDetection>>>,
    last: Mutex<Vec<ClassifiedDetection>>,
}

impl ScriptedClassifier {
    pub fn repeating(detections: Vec<ClassifiedDetection>) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([detections])),
            last: Mutex::new(Vec::new()),
        }
    }
}

impl ObjectClassifier for ScriptedClassifier {
    fn classify(&self, _image: &RgbaImage) -> Vec<ClassifiedDetection> {
        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        last.clone()
    }
}
