//! Fusion loop: turns detection batches into a stable set of tracked taxa.
//!
//! This module implements the per-poll cycle:
//! - Detection-to-sample projection against depth
//! - Greedy fixed-point merge of putative and tracked taxa
//! - Visibility bookkeeping and removal policy
//! - Added/updated/removed diffing and event fan-out

pub mod config;
pub mod events;
pub mod fusion;
pub mod projector;
pub mod result;
pub mod state;
pub mod tracker;

pub use config::TrackerConfig;
pub use events::{EventHub, TaxonEvent, TaxonEventData};
pub use fusion::{FusionConfig, FusionPass, PassOutcome, PassProgress};
pub use projector::{EdgeFlags, ProjectorConfig, SampleProjector, sample_pattern};
pub use result::{FusionCounts, FusionReport};
pub use state::PollingState;
pub use tracker::CameraTaxonTracker;
