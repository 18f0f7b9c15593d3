//! Minimum interval between classification requests.
//!
//! The limit is process-wide: every tracker in the process shares the
//! [`global`] throttle, so several trackers cannot multiply the request rate
//! to the camera and classifier.

use std::time::{Duration, Instant};

use parking_lot::{Mutex, const_mutex};

/// Rate limiter holding the time of the last granted request.
#[derive(Debug)]
pub struct RequestThrottle {
    last_request: Mutex<Option<Instant>>,
}

static GLOBAL_THROTTLE: RequestThrottle = RequestThrottle::new();

/// Throttle shared by all trackers in the process.
pub fn global() -> &'static RequestThrottle {
    &GLOBAL_THROTTLE
}

impl RequestThrottle {
    pub const fn new() -> Self {
        Self {
            last_request: const_mutex(None),
        }
    }

    /// Grant a request at `now` if `min_interval` has passed since the last
    /// one, recording it. Otherwise returns the remaining wait.
    pub fn try_acquire(&self, min_interval: Duration, now: Instant) -> Result<(), Duration> {
        let mut last = self.last_request.lock();
        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < min_interval {
                return Err(min_interval - elapsed);
            }
        }
        *last = Some(now);
        Ok(())
    }

    /// Time of the last granted request.
    pub fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock()
    }
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_granted() {
        let throttle = RequestThrottle::new();
        let now = Instant::now();
        assert!(throttle.try_acquire(Duration::from_millis(100), now).is_ok());
        assert_eq!(throttle.last_request(), Some(now));
    }

    #[test]
    fn test_request_inside_interval_reports_remaining_wait() {
        let throttle = RequestThrottle::new();
        let t0 = Instant::now();
        let interval = Duration::from_millis(100);
        throttle.try_acquire(interval, t0).unwrap();

        let wait = throttle
            .try_acquire(interval, t0 + Duration::from_millis(30))
            .unwrap_err();
        assert_eq!(wait, Duration::from_millis(70));
        // A refused request does not move the window
        assert_eq!(throttle.last_request(), Some(t0));

        assert!(throttle
            .try_acquire(interval, t0 + Duration::from_millis(100))
            .is_ok());
    }
}
