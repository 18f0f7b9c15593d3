use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use image::RgbaImage;
use nalgebra::{Vector2, Vector3};
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taxon_tracker::camera::{
    CameraEye, CameraIntrinsics, CameraSnapshot, ClassifiedDetection, DepthRaycaster,
};
use taxon_tracker::geometry::{CameraPose, Ray};
use taxon_tracker::system::{CameraSource, ObjectClassifier, SystemClock};
use taxon_tracker::{CameraTaxonTracker, TaxonEvent, TrackerConfig};

const RESOLUTION: (u32, u32) = (640, 480);
const FOCAL_PX: f64 = 500.0;
const ORBIT_RADIUS: f64 = 1.2;
const FRAMES: usize = 600;

/// Ball-shaped object in the synthetic room.
struct SceneObject {
    name: &'static str,
    center: Vector3<f64>,
    radius: f64,
}

fn scene() -> Arc<Vec<SceneObject>> {
    Arc::new(vec![
        SceneObject {
            name: "cup",
            center: Vector3::new(0.2, 0.0, 0.1),
            radius: 0.05,
        },
        SceneObject {
            name: "bowl",
            center: Vector3::new(-0.25, -0.05, -0.1),
            radius: 0.09,
        },
        SceneObject {
            name: "plant",
            center: Vector3::new(0.0, 0.1, -0.35),
            radius: 0.15,
        },
    ])
}

/// Raycaster against the scene spheres.
struct SceneDepth {
    objects: Arc<Vec<SceneObject>>,
}

impl DepthRaycaster for SceneDepth {
    fn raycast(&self, ray: &Ray, max_distance: f64) -> Option<Vector3<f64>> {
        self.objects
            .iter()
            .filter_map(|obj| {
                let oc = ray.origin - obj.center;
                let b = oc.dot(&ray.direction);
                let c = oc.norm_squared() - obj.radius * obj.radius;
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                let t = -b - disc.sqrt();
                (t > 0.0 && t <= max_distance).then_some(t)
            })
            .min_by(|a, b| a.total_cmp(b))
            .map(|t| ray.at(t))
    }
}

/// Camera circling the scene at eye height.
struct OrbitCamera {
    angle: Mutex<f64>,
}

impl OrbitCamera {
    fn advance(&self, radians: f64) {
        *self.angle.lock() += radians;
    }
}

impl CameraSource for OrbitCamera {
    fn snapshot(&self) -> CameraSnapshot {
        let angle = *self.angle.lock();
        let position = Vector3::new(ORBIT_RADIUS * angle.sin(), 0.3, ORBIT_RADIUS * angle.cos());
        let pose = CameraPose::looking_at(position, Vector3::zeros(), Vector3::y());
        CameraSnapshot::new(
            CameraEye::Left,
            pose,
            CameraIntrinsics::centered(FOCAL_PX, RESOLUTION),
        )
    }

    fn capture_still(&self) -> Option<RgbaImage> {
        Some(RgbaImage::new(RESOLUTION.0, RESOLUTION.1))
    }
}

/// "Classifier" that projects the scene objects through the orbit camera.
struct SceneClassifier {
    objects: Arc<Vec<SceneObject>>,
    camera: Arc<OrbitCamera>,
}

impl ObjectClassifier for SceneClassifier {
    fn classify(&self, _image: &RgbaImage) -> Vec<ClassifiedDetection> {
        let snapshot = self.camera.snapshot();
        let (w, h) = (RESOLUTION.0 as f64, RESOLUTION.1 as f64);
        let k = snapshot.intrinsics;

        self.objects
            .iter()
            .filter_map(|obj| {
                let cam = snapshot.pose.rotation.inverse() * (obj.center - snapshot.pose.position);
                if cam.z <= 0.0 {
                    return None;
                }
                let px = Vector2::new(
                    k.focal_length.x * cam.x / cam.z + k.principal_point.x,
                    k.focal_length.y * cam.y / cam.z + k.principal_point.y,
                );
                let size = 2.0 * obj.radius * k.focal_length.x / cam.z;
                let det = ClassifiedDetection::new(
                    obj.name,
                    px.x / w - 0.5,
                    0.5 - px.y / h,
                    size / w,
                    size / h,
                );
                (det.center_x.abs() < 0.5 && det.center_y.abs() < 0.5).then_some(det)
            })
            .collect()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TrackerConfig::from_yaml_file(&path)?,
        None => TrackerConfig::default(),
    };

    let objects = scene();
    let camera = Arc::new(OrbitCamera {
        angle: Mutex::new(0.0),
    });
    let classifier = Arc::new(SceneClassifier {
        objects: Arc::clone(&objects),
        camera: Arc::clone(&camera),
    });

    let mut tracker = CameraTaxonTracker::new(
        config,
        Arc::new(SceneDepth { objects }),
        camera.clone(),
        classifier,
        Arc::new(SystemClock),
    );
    let events = tracker.subscribe();

    info!(frames = FRAMES, "starting synthetic orbit");
    for _ in 0..FRAMES {
        camera.advance(0.01);
        if tracker.is_idle() {
            tracker.start_polling()?;
        }
        tracker.update();

        for event in events.try_iter() {
            let taxon = event.taxon();
            let c = taxon.center();
            println!(
                "{:<8} {} {:<6} center=({:+.3}, {:+.3}, {:+.3}) reliability={:.2}",
                event.kind(),
                event.id(),
                taxon.name(),
                c.x,
                c.y,
                c.z,
                taxon.reliability()
            );
        }
        thread::sleep(Duration::from_millis(16));
    }
    tracker.stop_polling();

    println!("\nTracked after {} frames:", FRAMES);
    for (id, taxon) in tracker.tracked_taxa() {
        let e = taxon.extent();
        let size = taxon
            .image_context()
            .map(|ctx| format!("{:.2} x {:.2} m", ctx.size.x, ctx.size.y))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {:<6} samples={} extent=({:.3}, {:.3}, {:.3}) image={} reliability={:.2}",
            id,
            taxon.name(),
            taxon.sample_count(),
            e.x,
            e.y,
            e.z,
            size,
            taxon.reliability()
        );
    }
    Ok(())
}
