//! Per-pass fusion report.
//!
//! Describes what one fusion pass did:
//! - which taxa were added, updated and removed
//! - how many detections arrived, projected and merged
//! - how long the pass took end to end

use crate::taxa::TaxonId;

/// Summary of one completed fusion pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionReport {
    pub added: Vec<TaxonId>,
    pub updated: Vec<TaxonId>,
    pub removed: Vec<TaxonId>,
    pub counts: FusionCounts,
    /// Wall time from pass start to completion, including yields.
    pub total_ms: f64,
}

/// Scalar counters for a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionCounts {
    /// Detections in the classifier batch.
    pub detections_received: usize,
    /// Detections left after the ignore list and duplicate folding.
    pub detections_kept: usize,
    /// Detections that produced a surface sample.
    pub detections_projected: usize,
    /// Collisions resolved by merging.
    pub merges: usize,
    /// Taxa dropped by the removal policy.
    pub evicted: usize,
    /// Taxa tracked after the pass.
    pub tracked: usize,
    /// Steps the pass needed, including the final one.
    pub steps: usize,
}

impl FusionReport {
    /// Whether the pass changed the tracked set in any visible way.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}
