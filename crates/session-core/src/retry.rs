//! Flat reconnect budget.
//!
//! Every session carries a counter of reconnect attempts consumed since the
//! last clean connection. The budget is flat: no backoff growth, just a
//! fixed cap with an optional fixed delay applied by the supervisor.

use std::sync::atomic::{AtomicU32, Ordering};

/// Counts reconnect attempts against a fixed cap.
///
/// The counter only moves forward via [`try_next_attempt`] and snaps back to
/// zero on [`reset`] when a connection is fully established. A cap of zero is
/// treated as one so a session always gets at least a single reconnect.
///
/// [`try_next_attempt`]: RetryBudget::try_next_attempt
/// [`reset`]: RetryBudget::reset
#[derive(Debug)]
pub struct RetryBudget {
    max: u32,
    used: AtomicU32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self { max: max.max(1), used: AtomicU32::new(0) }
    }

    /// Consume one attempt. Returns the attempt number (1-based) if the
    /// budget still has room, `None` once it is exhausted.
    pub fn try_next_attempt(&self) -> Option<u32> {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                if used < self.max {
                    Some(used + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Clear consumed attempts after a successful connection.
    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }

    /// Attempts consumed in the current disruption streak.
    pub fn attempts(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}
