//! Retry bookkeeping for one attempt cycle.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::backoff::Backoff;

// ============================================================================
// RetryState
// ============================================================================

/// Attempt counter, budget and backoff of the active cycle.
///
/// `cycle` increases every time a cycle begins. A cycle that wakes up from
/// a backoff wait compares its id against it to detect that it was
/// superseded.
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    /// Id of the most recent cycle.
    pub cycle: u64,
    /// Retries made in the current cycle.
    pub attempts: u32,
    /// Retry budget of the current cycle. `None` is unbounded.
    pub limit: Option<u32>,
    /// Delay generator, dropped once the cycle succeeds.
    pub backoff: Option<Backoff>,
}

impl RetryState {
    /// Starts a new cycle and returns its id.
    pub fn begin(&mut self, limit: Option<u32>) -> u64 {
        self.cycle += 1;
        self.attempts = 0;
        self.limit = limit;
        self.backoff = Some(Backoff::new());
        self.cycle
    }

    /// Returns `true` once the budget is consumed.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.attempts >= limit)
    }

    /// Counts a retry and returns the delay before it.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.backoff.get_or_insert_with(Backoff::new).advance()
    }

    /// Discards the backoff after a successful attempt.
    #[inline]
    pub fn succeed(&mut self) {
        self.backoff = None;
    }
}

// ============================================================================
// Tests
// ============================================================================
