//! Reconnect delay sequence.
//!
//! Delays follow the Fibonacci sequence in seconds (0, 1, 1, 2, 3, 5, ...)
//! until they reach [`MAX_DELAY`], then stay there.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Ceiling for a single reconnect delay.
pub const MAX_DELAY: Duration = Duration::from_secs(120);

// ============================================================================
// Backoff
// ============================================================================

/// Bounded Fibonacci backoff.
///
/// One instance covers one attempt cycle. Start a new cycle with a fresh
/// [`Backoff::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: u64,
    next: u64,
}

impl Backoff {
    /// Creates a sequence starting at zero seconds.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: 0,
            next: 1,
        }
    }

    /// Returns the delay to wait before the next attempt and advances.
    pub fn advance(&mut self) -> Duration {
        let max = MAX_DELAY.as_secs();
        if self.current >= max {
            return MAX_DELAY;
        }

        let delay = self.current;
        (self.current, self.next) = (self.next, self.current + self.next);
        Duration::from_secs(delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.advance())
    }
}

// ============================================================================
// Tests
// ============================================================================
