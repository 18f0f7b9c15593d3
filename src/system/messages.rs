//! Messages sent from the poll worker to the tracker's owner thread.

use crate::camera::DetectionBatch;

/// Result of one poll: everything the classifier found in one still.
pub struct PollResultMsg {
    /// Poll generation the worker was started for. The tracker ignores
    /// results from generations it has since stopped or replaced.
    pub generation: u64,

    pub batch: DetectionBatch,
}
