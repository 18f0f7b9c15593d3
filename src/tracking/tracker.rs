//! CameraTaxonTracker: the public facade.
//!
//! Owns the tracked set and drives the poll/fusion cycle:
//! - `start_polling` launches a background worker for one classification
//! - `update` (called once per frame on the owner thread) picks up the
//!   worker's batch and advances the fusion pass by one bounded step
//! - on completion the staged tracked set is committed and events are
//!   published in updated, added, removed order

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::camera::{DepthRaycaster, DetectionBatch};
use crate::system::{
    CameraSource, Clock, ObjectClassifier, PollRequest, PollResultMsg, PollShared,
    spawn_poll_worker, throttle,
};
use crate::taxa::{CameraTrackedTaxon, TaxonId, TaxonRegistry};

use super::config::TrackerConfig;
use super::events::{EventHub, TaxonEvent, TaxonEventData};
use super::fusion::{FusionPass, PassOutcome, PassProgress};
use super::projector::SampleProjector;
use super::result::FusionReport;
use super::state::PollingState;

/// Handle to the worker of the current poll.
struct ActivePoll {
    shared: Arc<PollShared>,
    handle: JoinHandle<()>,
}

impl ActivePoll {
    /// The worker thread has exited, with or without sending a batch.
    fn worker_exited(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Multi-observation object tracker.
pub struct CameraTaxonTracker {
    config: TrackerConfig,

    /// Committed tracked set. Only replaced by a completed pass.
    registry: TaxonRegistry,

    projector: SampleProjector,
    camera: Arc<dyn CameraSource>,
    classifier: Arc<dyn ObjectClassifier>,
    clock: Arc<dyn Clock>,

    events: EventHub,

    /// Single-flight guard.
    state: PollingState,

    /// Bumped on every start and stop so late worker results can be told apart.
    generation: u64,

    poll: Option<ActivePoll>,
    results_tx: Sender<PollResultMsg>,
    results_rx: Receiver<PollResultMsg>,

    /// Fusion pass being stepped by `update`.
    pass: Option<FusionPass>,

    rng: StdRng,
    last_report: Option<FusionReport>,
}

impl CameraTaxonTracker {
    pub fn new(
        config: TrackerConfig,
        raycaster: Arc<dyn DepthRaycaster>,
        camera: Arc<dyn CameraSource>,
        classifier: Arc<dyn ObjectClassifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let projector = SampleProjector::new(
            config.projector,
            config.taxon.sample_extent_factor,
            raycaster,
        );
        let rng = match config.fusion.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (results_tx, results_rx) = unbounded();

        Self {
            config,
            registry: TaxonRegistry::new(),
            projector,
            camera,
            classifier,
            clock,
            events: EventHub::new(),
            state: PollingState::Idle,
            generation: 0,
            poll: None,
            results_tx,
            results_rx,
            pass: None,
            rng,
            last_report: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// True when no poll or fusion pass is in flight.
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    pub fn state(&self) -> PollingState {
        self.state
    }

    /// Receive every future taxon event.
    pub fn subscribe(&mut self) -> Receiver<TaxonEvent> {
        self.events.subscribe()
    }

    /// Owned copy of the tracked set.
    pub fn tracked_taxa(&self) -> Vec<(TaxonId, CameraTrackedTaxon)> {
        self.registry.snapshot()
    }

    pub fn get(&self, id: TaxonId) -> Option<&CameraTrackedTaxon> {
        self.registry.get(id)
    }

    pub fn tracked_count(&self) -> usize {
        self.registry.len()
    }

    pub fn last_report(&self) -> Option<&FusionReport> {
        self.last_report.as_ref()
    }

    /// Begin one poll cycle. A no-op while a cycle is already in flight.
    ///
    /// Errors only when the worker thread cannot be spawned.
    pub fn start_polling(&mut self) -> Result<()> {
        if !self.state.is_idle() {
            debug!(generation = self.generation, "poll already in flight, ignoring start");
            return Ok(());
        }

        self.generation += 1;
        let generation = self.generation;
        let shared = PollShared::new();
        let handle = spawn_poll_worker(PollRequest {
            generation,
            config: self.config.polling,
            shared: Arc::clone(&shared),
            camera: Arc::clone(&self.camera),
            classifier: Arc::clone(&self.classifier),
            throttle: throttle::global(),
            sender: self.results_tx.clone(),
        })?;

        self.poll = Some(ActivePoll {
            shared,
            handle,
        });
        self.state = PollingState::Polling { generation };
        info!(generation, "polling started");
        Ok(())
    }

    /// Cancel the in-flight poll and drop any unfinished fusion pass.
    ///
    /// The tracked set stays exactly as the last completed pass left it.
    pub fn stop_polling(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.shared.request_cancel();
        }
        let dropped_pass = self.pass.take().is_some();
        if !self.state.is_idle() {
            info!(generation = self.generation, dropped_pass, "polling stopped");
        }
        self.generation += 1;
        self.state = PollingState::Idle;
    }

    /// Advance the poll cycle by one bounded step.
    ///
    /// Returns the report of a pass that completed during this call.
    pub fn update(&mut self) -> Option<FusionReport> {
        if self.pass.is_none() {
            // Checked before draining: a worker sends before it exits
            let worker_exited = self.poll.as_ref().is_some_and(ActivePoll::worker_exited);
            self.pass = self.receive_batch();
            if self.pass.is_none() && worker_exited {
                warn!(generation = self.generation, "poll worker exited without a batch");
                self.poll = None;
                self.state = PollingState::Idle;
                return None;
            }
        }
        let pass = self.pass.take()?;

        match pass.step(&mut self.projector) {
            PassProgress::Pending(next) => {
                self.pass = Some(*next);
                None
            }
            PassProgress::Complete(outcome) => {
                self.poll = None;
                self.state = PollingState::Idle;
                Some(self.commit(outcome))
            }
        }
    }

    /// Run a full pass over `batch` on the calling thread.
    ///
    /// Returns `None` without touching the tracked set while a poll is in
    /// flight.
    pub fn process_batch(&mut self, batch: DetectionBatch) -> Option<FusionReport> {
        if !self.state.is_idle() {
            debug!("poll in flight, ignoring direct batch");
            return None;
        }
        let outcome = self.begin_pass(batch).run_to_completion(&mut self.projector);
        Some(self.commit(outcome))
    }

    fn receive_batch(&mut self) -> Option<FusionPass> {
        let current = self.state.generation()?;
        while let Ok(msg) = self.results_rx.try_recv() {
            if msg.generation != current {
                debug!(generation = msg.generation, current, "discarding stale poll result");
                continue;
            }
            return Some(self.begin_pass(msg.batch));
        }
        None
    }

    fn begin_pass(&mut self, batch: DetectionBatch) -> FusionPass {
        let observed_at = self.clock.now();
        let pass_rng = StdRng::seed_from_u64(self.rng.gen());
        debug!(detections = batch.len(), tracked = self.registry.len(), "fusion pass started");
        FusionPass::new(
            batch,
            &self.registry,
            observed_at,
            &self.config.fusion,
            self.config.taxon,
            pass_rng,
        )
    }

    fn commit(&mut self, outcome: PassOutcome) -> FusionReport {
        let PassOutcome {
            registry,
            added,
            updated,
            removed,
            report,
        } = outcome;

        let event_for = |id: TaxonId| {
            registry.get(id).map(|taxon| TaxonEventData {
                id,
                taxon: taxon.clone(),
            })
        };
        let mut events: Vec<TaxonEvent> =
            Vec::with_capacity(added.len() + updated.len() + removed.len());
        events.extend(updated.iter().filter_map(|&id| event_for(id)).map(TaxonEvent::Updated));
        events.extend(added.iter().filter_map(|&id| event_for(id)).map(TaxonEvent::Added));
        events.extend(
            removed
                .into_iter()
                .map(|(id, taxon)| TaxonEvent::Removed(TaxonEventData { id, taxon })),
        );

        self.registry = registry;
        self.events.publish(&events);

        info!(
            added = report.added.len(),
            updated = report.updated.len(),
            removed = report.removed.len(),
            merges = report.counts.merges,
            tracked = report.counts.tracked,
            total_ms = report.total_ms,
            "fusion pass complete"
        );
        self.last_report = Some(report.clone());
        report
    }
}

impl Drop for CameraTaxonTracker {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.shared.request_cancel();
        }
    }
}
