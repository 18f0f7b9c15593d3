//! One fusion pass: detections in, added/updated/removed taxa out.
//!
//! The pass runs as a resumable state machine so the owner thread can spread
//! it over several frames:
//!
//! ```text
//!   Projecting --(all detections projected)--> Merging
//!   Merging    --(putative queue empty)------> Finalizing
//!   Finalizing --(bookkeeping + diff)--------> Complete(outcome)
//! ```
//!
//! All mutation happens on a staged copy of the registry. The tracked set is
//! only replaced when the caller commits a completed outcome, so dropping a
//! pass part way leaves nothing half merged.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::{DetectionBatch, prefilter_detections};
use crate::taxa::{
    CameraTrackedTaxon, Survivor, TaxonConfig, TaxonId, TaxonRegistry, choose_survivor, collides,
    merge_into,
};

use super::projector::SampleProjector;
use super::result::{FusionCounts, FusionReport};

/// Fusion pass tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Detections projected per step (each costs 5-9 raycasts).
    pub projections_per_step: usize,
    /// Merge-queue iterations per step.
    pub merge_iterations_per_step: usize,
    /// Seed for the outlier filter; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
    /// Class names dropped before projection.
    pub ignored_classes: Vec<String>,
    /// Fold overlapping same-class rectangles before projection.
    pub merge_overlapping_detections: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            projections_per_step: 4,
            merge_iterations_per_step: 4,
            rng_seed: None,
            ignored_classes: Vec::new(),
            merge_overlapping_detections: true,
        }
    }
}

/// Result of advancing a pass by one step.
pub enum PassProgress {
    /// More work remains; step the returned pass again later.
    Pending(Box<FusionPass>),
    Complete(PassOutcome),
}

/// Everything a completed pass produced.
#[derive(Debug)]
pub struct PassOutcome {
    /// Tracked set after the pass, to be committed by the caller.
    pub registry: TaxonRegistry,
    /// New handles, in tracked order.
    pub added: Vec<TaxonId>,
    /// Pre-existing handles whose taxon absorbed new samples.
    pub updated: Vec<TaxonId>,
    /// Handles no longer tracked, with the taxon as it was when dropped.
    pub removed: Vec<(TaxonId, CameraTrackedTaxon)>,
    pub report: FusionReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Projecting,
    Merging,
    Finalizing,
}

/// A fusion pass in progress.
pub struct FusionPass {
    phase: Phase,
    batch: DetectionBatch,
    next_detection: usize,
    /// Timestamp of the camera observation; also stamps new samples.
    observed_at: Instant,
    previous: TaxonRegistry,
    staged: TaxonRegistry,
    putative: VecDeque<(TaxonId, CameraTrackedTaxon)>,
    merged: Vec<TaxonId>,
    taxon_config: TaxonConfig,
    projections_per_step: usize,
    merge_iterations_per_step: usize,
    rng: StdRng,
    counts: FusionCounts,
    started: Instant,
}

impl FusionPass {
    /// Start a pass over `batch` against the current tracked set.
    pub fn new(
        mut batch: DetectionBatch,
        tracked: &TaxonRegistry,
        observed_at: Instant,
        config: &FusionConfig,
        taxon_config: TaxonConfig,
        rng: StdRng,
    ) -> Self {
        let received = batch.detections.len();
        batch.detections = prefilter_detections(
            std::mem::take(&mut batch.detections),
            &config.ignored_classes,
            config.merge_overlapping_detections,
        );
        let counts = FusionCounts {
            detections_received: received,
            detections_kept: batch.detections.len(),
            ..Default::default()
        };

        Self {
            phase: Phase::Projecting,
            batch,
            next_detection: 0,
            observed_at,
            previous: tracked.clone(),
            staged: tracked.clone(),
            putative: VecDeque::new(),
            merged: Vec::new(),
            taxon_config,
            projections_per_step: config.projections_per_step.max(1),
            merge_iterations_per_step: config.merge_iterations_per_step.max(1),
            rng,
            counts,
            started: Instant::now(),
        }
    }

    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }

    /// Do a bounded slice of work.
    pub fn step(mut self, projector: &mut SampleProjector) -> PassProgress {
        self.counts.steps += 1;
        match self.phase {
            Phase::Projecting => {
                self.project_some(projector);
                PassProgress::Pending(Box::new(self))
            }
            Phase::Merging => {
                self.merge_some();
                PassProgress::Pending(Box::new(self))
            }
            Phase::Finalizing => PassProgress::Complete(self.finalize()),
        }
    }

    /// Step until complete.
    pub fn run_to_completion(self, projector: &mut SampleProjector) -> PassOutcome {
        let mut pass = self;
        loop {
            match pass.step(projector) {
                PassProgress::Pending(next) => pass = *next,
                PassProgress::Complete(outcome) => return outcome,
            }
        }
    }

    fn project_some(&mut self, projector: &mut SampleProjector) {
        let end = (self.next_detection + self.projections_per_step)
            .min(self.batch.detections.len());
        for index in self.next_detection..end {
            let detection = &self.batch.detections[index];
            let Some(sample) = projector.project(
                detection,
                &self.batch.snapshot,
                &self.batch.image,
                self.observed_at,
            ) else {
                continue;
            };
            let taxon = CameraTrackedTaxon::with_samples(
                detection.class_name.clone(),
                vec![sample],
                self.taxon_config,
                &mut self.rng,
            );
            let id = self.staged.allocate_id();
            self.putative.push_back((id, taxon));
            self.counts.detections_projected += 1;
        }
        self.next_detection = end;

        if self.next_detection >= self.batch.detections.len() {
            self.phase = Phase::Merging;
        }
    }

    /// Greedy fixed-point merge against the staged tracked set.
    ///
    /// A merged taxon goes back into the queue because the grown taxon may
    /// now collide with another tracked one.
    fn merge_some(&mut self) {
        for _ in 0..self.merge_iterations_per_step {
            let Some((putative_id, putative)) = self.putative.pop_front() else {
                self.phase = Phase::Finalizing;
                return;
            };

            let hit = self
                .staged
                .iter()
                .find(|(_, existing)| collides(existing, &putative))
                .map(|(id, _)| id);

            let Some(existing_id) = hit else {
                self.staged.insert_with_id(putative_id, putative);
                continue;
            };
            let Some(existing) = self.staged.remove(existing_id) else {
                self.staged.insert_with_id(putative_id, putative);
                continue;
            };

            let (survivor_id, mut survivor, absorbed_id, absorbed) =
                match choose_survivor(&existing, &putative) {
                    Survivor::First => (existing_id, existing, putative_id, putative),
                    Survivor::Second => (putative_id, putative, existing_id, existing),
                };
            debug!(
                survivor = %survivor_id,
                absorbed = %absorbed_id,
                name = survivor.name(),
                "merging taxa"
            );
            merge_into(&mut survivor, absorbed, &mut self.rng);
            self.counts.merges += 1;
            self.merged.push(survivor_id);
            self.putative.push_back((survivor_id, survivor));
        }

        if self.putative.is_empty() {
            self.phase = Phase::Finalizing;
        }
    }

    fn finalize(mut self) -> PassOutcome {
        let pose = self.batch.snapshot.pose;
        let camera_position = pose.position;
        let camera_forward = pose.forward();

        let mut evicted: Vec<(TaxonId, CameraTrackedTaxon)> = Vec::new();
        for id in self.staged.ids() {
            let Some(taxon) = self.staged.get_mut(id) else {
                continue;
            };
            taxon.note_camera_observation(self.observed_at, &camera_position, &camera_forward);
            if let Some(reason) = taxon.removal_reason(self.observed_at) {
                debug!(taxon = %id, name = taxon.name(), ?reason, "evicting taxon");
                if let Some(taxon) = self.staged.remove(id) {
                    evicted.push((id, taxon));
                }
            }
        }
        self.counts.evicted = evicted.len();

        let added: Vec<TaxonId> = self
            .staged
            .ids()
            .into_iter()
            .filter(|id| !self.previous.contains(*id))
            .collect();

        let mut seen: HashSet<TaxonId> = added.iter().copied().collect();
        let updated: Vec<TaxonId> = self
            .merged
            .iter()
            .copied()
            .filter(|id| self.staged.contains(*id) && seen.insert(*id))
            .collect();

        let mut removed = evicted;
        let mut removed_ids: HashSet<TaxonId> = removed.iter().map(|(id, _)| *id).collect();
        for (id, taxon) in self.previous.iter() {
            if !self.staged.contains(id) && removed_ids.insert(id) {
                removed.push((id, taxon.clone()));
            }
        }

        self.counts.tracked = self.staged.len();
        let report = FusionReport {
            added: added.clone(),
            updated: updated.clone(),
            removed: removed.iter().map(|(id, _)| *id).collect(),
            counts: self.counts,
            total_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        };

        PassOutcome {
            registry: self.staged,
            added,
            updated,
            removed,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use rand::SeedableRng;

    use crate::camera::PlaneRaycaster;
    use crate::taxa::RansacParams;
    use crate::test_support::{batch_at, detection, origin_snapshot};
    use crate::tracking::projector::ProjectorConfig;

    fn projector() -> SampleProjector {
        SampleProjector::new(
            ProjectorConfig::default(),
            0.5,
            Arc::new(PlaneRaycaster::at_depth(1.0)),
        )
    }

    fn no_filter() -> TaxonConfig {
        TaxonConfig {
            ransac: RansacParams {
                max_iterations: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn run(
        registry: &TaxonRegistry,
        batch: DetectionBatch,
        at: Instant,
        config: &FusionConfig,
    ) -> PassOutcome {
        FusionPass::new(batch, registry, at, config, no_filter(), StdRng::seed_from_u64(1))
            .run_to_completion(&mut projector())
    }

    #[test]
    fn test_single_detection_is_added() {
        let registry = TaxonRegistry::new();
        let batch = batch_at(origin_snapshot(), vec![detection("cup", 0.0, 0.0, 0.1, 0.1)]);
        let outcome = run(&registry, batch, Instant::now(), &FusionConfig::default());

        assert_eq!(outcome.added.len(), 1);
        assert!(outcome.updated.is_empty());
        assert!(outcome.removed.is_empty());
        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(outcome.report.counts.detections_projected, 1);
    }

    #[test]
    fn test_pass_yields_between_steps() {
        let registry = TaxonRegistry::new();
        let detections = (0..6)
            .map(|i| detection("cup", -0.3 + 0.12 * i as f64, 0.0, 0.05, 0.05))
            .collect();
        let batch = batch_at(origin_snapshot(), detections);
        let config = FusionConfig {
            projections_per_step: 2,
            merge_iterations_per_step: 2,
            merge_overlapping_detections: false,
            ..Default::default()
        };
        let mut pass = FusionPass::new(
            batch,
            &registry,
            Instant::now(),
            &config,
            no_filter(),
            StdRng::seed_from_u64(1),
        );
        let mut proj = projector();
        let mut pending = 0;
        let outcome = loop {
            match pass.step(&mut proj) {
                PassProgress::Pending(next) => {
                    pending += 1;
                    pass = *next;
                }
                PassProgress::Complete(outcome) => break outcome,
            }
        };
        // 3 projection steps + at least 3 merge steps
        assert!(pending >= 6, "only {pending} pending steps");
        assert_eq!(outcome.report.counts.steps, pending + 1);
        assert_eq!(outcome.report.counts.detections_projected, 6);
    }

    #[test]
    fn test_abandoned_pass_leaves_registry_untouched() {
        let mut registry = TaxonRegistry::new();
        let t0 = Instant::now();
        let first = run(
            &registry,
            batch_at(origin_snapshot(), vec![detection("cup", 0.0, 0.0, 0.1, 0.1)]),
            t0,
            &FusionConfig::default(),
        );
        registry = first.registry;
        let before = registry.ids();

        let pass = FusionPass::new(
            batch_at(origin_snapshot(), vec![detection("cup", 0.0, 0.0, 0.1, 0.1)]),
            &registry,
            t0 + Duration::from_secs(1),
            &FusionConfig::default(),
            no_filter(),
            StdRng::seed_from_u64(2),
        );
        let mut proj = projector();
        match pass.step(&mut proj) {
            PassProgress::Pending(pass) => drop(pass),
            PassProgress::Complete(_) => panic!("single step should not finish the pass"),
        }
        assert_eq!(registry.ids(), before);
        let taxon = registry.get(before[0]).unwrap();
        assert_eq!(taxon.sample_count(), 1);
    }

    #[test]
    fn test_ignored_classes_never_tracked() {
        let registry = TaxonRegistry::new();
        let config = FusionConfig {
            ignored_classes: vec!["person".to_string()],
            ..Default::default()
        };
        let batch = batch_at(origin_snapshot(), vec![detection("person", 0.0, 0.0, 0.2, 0.4)]);
        let outcome = run(&registry, batch, Instant::now(), &config);
        assert!(outcome.registry.is_empty());
        assert_eq!(outcome.report.counts.detections_received, 1);
        assert_eq!(outcome.report.counts.detections_kept, 0);
    }

    #[test]
    fn test_duplicate_detections_in_one_batch_merge() {
        let registry = TaxonRegistry::new();
        // Overlapping rectangles; keep them apart in 2D so the 3D merge does
        // the folding.
        let config = FusionConfig {
            merge_overlapping_detections: false,
            ..Default::default()
        };
        let batch = batch_at(
            origin_snapshot(),
            vec![
                detection("cup", 0.0, 0.0, 0.1, 0.1),
                detection("cup", 0.002, 0.0, 0.1, 0.1),
            ],
        );
        let outcome = run(&registry, batch, Instant::now(), &config);
        assert_eq!(outcome.registry.len(), 1);
        assert_eq!(outcome.report.counts.merges, 1);
        // Both handles are new, so the survivor counts as added only
        assert_eq!(outcome.added.len(), 1);
        assert!(outcome.updated.is_empty());
        let (_, taxon) = outcome.registry.iter().next().unwrap();
        assert_eq!(taxon.sample_count(), 2);
    }

    #[test]
    fn test_diff_sets_are_disjoint() {
        let t0 = Instant::now();
        let registry = TaxonRegistry::new();
        let first = run(
            &registry,
            batch_at(
                origin_snapshot(),
                vec![
                    detection("cup", 0.0, 0.0, 0.1, 0.1),
                    detection("book", 0.3, 0.3, 0.1, 0.1),
                ],
            ),
            t0,
            &FusionConfig::default(),
        );
        let registry = first.registry;
        assert_eq!(registry.len(), 2);

        // Second pass long after: the book goes stale, the cup is refreshed
        // and a bowl appears.
        let later = t0 + Duration::from_secs(400);
        let second = run(
            &registry,
            batch_at(
                origin_snapshot(),
                vec![
                    detection("cup", 0.0, 0.0, 0.1, 0.1),
                    detection("bowl", -0.3, 0.0, 0.1, 0.1),
                ],
            ),
            later,
            &FusionConfig::default(),
        );

        let added: HashSet<_> = second.added.iter().copied().collect();
        let removed: HashSet<_> = second.removed.iter().map(|(id, _)| *id).collect();
        assert!(added.is_disjoint(&removed));
        for id in registry.ids() {
            if !second.registry.contains(id) {
                assert!(removed.contains(&id));
            }
        }
        let names: Vec<_> = second.removed.iter().map(|(_, t)| t.name().to_string()).collect();
        assert_eq!(names, vec!["book".to_string()]);
        assert_eq!(second.updated.len(), 1);
        assert_eq!(second.added.len(), 1);
    }
}
