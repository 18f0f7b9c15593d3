//! Background poll worker: waits out the throttle, grabs a camera still,
//! classifies it and hands the batch to the tracker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::camera::DetectionBatch;

use super::messages::PollResultMsg;
use super::shared_state::PollShared;
use super::sources::{CameraSource, ObjectClassifier};
use super::throttle::RequestThrottle;

/// Longest uninterrupted sleep; cancellation is noticed within this time.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Poll timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Fixed delay before every poll.
    pub initial_delay_ms: u64,
    /// Minimum time between two classification requests in the process.
    pub min_request_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            min_request_interval_ms: 100,
        }
    }
}

impl PollingConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

/// Everything one poll worker needs.
pub struct PollRequest {
    pub generation: u64,
    pub config: PollingConfig,
    pub shared: Arc<PollShared>,
    pub camera: Arc<dyn CameraSource>,
    pub classifier: Arc<dyn ObjectClassifier>,
    pub throttle: &'static RequestThrottle,
    pub sender: Sender<PollResultMsg>,
}

/// Spawn a worker thread that performs exactly one poll.
pub fn spawn_poll_worker(request: PollRequest) -> Result<JoinHandle<()>> {
    let generation = request.generation;
    thread::Builder::new()
        .name(format!("taxon-poll-{generation}"))
        .spawn(move || run_poll(request))
        .with_context(|| format!("failed to spawn poll worker for generation {generation}"))
}

fn run_poll(request: PollRequest) {
    let PollRequest {
        generation,
        config,
        shared,
        camera,
        classifier,
        throttle,
        sender,
    } = request;

    debug!(generation, "poll worker started");

    if !sleep_unless_cancelled(config.initial_delay(), &shared) {
        debug!(generation, "poll cancelled during initial delay");
        return;
    }

    let (snapshot, image) = loop {
        if !wait_for_throttle(throttle, config.min_request_interval(), &shared) {
            debug!(generation, "poll cancelled while throttled");
            return;
        }
        let snapshot = camera.snapshot();
        match camera.capture_still() {
            Some(image) => break (snapshot, image),
            None => {
                let retries = shared.note_capture_retry();
                warn!(generation, retries, "camera image not ready, retrying poll");
            }
        }
    };

    let detections = classifier.classify(&image);
    if shared.is_cancelled() {
        debug!(generation, "poll cancelled after classification");
        return;
    }

    info!(
        generation,
        detections = detections.len(),
        width = image.width(),
        height = image.height(),
        "poll complete"
    );
    let batch = DetectionBatch::new(snapshot, Arc::new(image), detections);
    if sender.send(PollResultMsg { generation, batch }).is_err() {
        debug!(generation, "tracker dropped before poll result was delivered");
    }
}

/// Sleep for `duration` in short slices. Returns false if cancelled.
fn sleep_unless_cancelled(duration: Duration, shared: &PollShared) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shared.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(WAIT_SLICE));
    }
}

/// Block until the throttle grants a request. Returns false if cancelled.
fn wait_for_throttle(throttle: &RequestThrottle, interval: Duration, shared: &PollShared) -> bool {
    loop {
        if shared.is_cancelled() {
            return false;
        }
        match throttle.try_acquire(interval, Instant::now()) {
            Ok(()) => return true,
            Err(remaining) => thread::sleep(remaining.min(WAIT_SLICE)),
        }
    }
}
