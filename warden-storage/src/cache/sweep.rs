//! Coarse whole-cache expiry.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden_core::Clock;

/// Tracks when a cache was last cleared and reports when it is due again.
///
/// This is not per-entry expiry: once `max_age` has elapsed since the last
/// clear, the owning cache drops everything.
pub struct TtlSweep {
    last_cleared_ms: AtomicI64,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TtlSweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlSweep")
            .field("last_cleared_ms", &self.last_cleared_ms.load(Ordering::Relaxed))
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl TtlSweep {
    pub fn new(max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now().timestamp_millis();
        Self {
            last_cleared_ms: AtomicI64::new(now),
            max_age,
            clock,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Returns true exactly once per elapsed period and resets the timer.
    ///
    /// When several threads race past the deadline only one of them wins the
    /// reset and is told to clear.
    pub fn due(&self) -> bool {
        let now = self.clock.now().timestamp_millis();
        let last = self.last_cleared_ms.load(Ordering::SeqCst);
        let max_age = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);
        if now.saturating_sub(last) <= max_age {
            return false;
        }
        self.last_cleared_ms
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Record an out-of-band clear.
    pub fn reset(&self) {
        let now = self.clock.now().timestamp_millis();
        self.last_cleared_ms.store(now, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ManualClock;

    #[test]
    fn test_due_after_max_age() {
        let clock = Arc::new(ManualClock::fixed());
        let sweep = TtlSweep::new(Duration::from_secs(60), clock.clone());
        assert!(!sweep.due());

        clock.advance(Duration::from_secs(60));
        assert!(!sweep.due());

        clock.advance(Duration::from_secs(1));
        assert!(sweep.due());
        assert!(!sweep.due());
    }

    #[test]
    fn test_reset_restarts_period() {
        let clock = Arc::new(ManualClock::fixed());
        let sweep = TtlSweep::new(Duration::from_secs(10), clock.clone());
        clock.advance(Duration::from_secs(8));
        sweep.reset();
        clock.advance(Duration::from_secs(8));
        assert!(!sweep.due());
    }
}
