//! State shared between the tracker and its poll worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Flags one poll worker shares with the tracker that started it.
///
/// Each `start_polling` call creates a fresh instance, so cancelling an old
/// worker never affects a newer one.
#[derive(Debug, Default)]
pub struct PollShared {
    /// Set by `stop_polling`; the worker checks it at every wait slice.
    cancelled: AtomicBool,

    /// Times the worker found the camera not ready and retried.
    capture_retries: AtomicU32,
}

impl PollShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ask the worker to stop at its next check.
    pub fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn note_capture_retry(&self) -> u32 {
        self.capture_retries.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn capture_retries(&self) -> u32 {
        self.capture_retries.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_visible_across_clones() {
        let shared = PollShared::new();
        let worker_side = Arc::clone(&shared);
        assert!(!worker_side.is_cancelled());
        shared.request_cancel();
        assert!(worker_side.is_cancelled());
    }

    #[test]
    fn test_retry_counter() {
        let shared = PollShared::new();
        assert_eq!(shared.note_capture_retry(), 1);
        assert_eq!(shared.note_capture_retry(), 2);
        assert_eq!(shared.capture_retries(), 2);
    }
}
