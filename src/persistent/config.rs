//! Retry and reconnect configuration.
//!
//! # Example
//!
//! ```ignore
//! use linesock::PersistentConnectionConfig;
//!
//! let config = PersistentConnectionConfig::new()
//!     .with_initial_retry_limit(Some(5))
//!     .with_overlap_manual_reconnect();
//! ```
//!
//! The config deserializes from camelCase keys, so it can live in a
//! configuration file:
//!
//! ```json
//! { "retryLimit": 20, "initialRetryLimit": 3, "overlapManualReconnect": true }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default retry budget of the first user-initiated connect.
pub const DEFAULT_INITIAL_RETRY_LIMIT: u32 = 3;

// ============================================================================
// PersistentConnectionConfig
// ============================================================================

/// Retry policy of a [`PersistentConnection`](crate::PersistentConnection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistentConnectionConfig {
    /// Retries after an established session drops. `None` is unbounded.
    pub retry_limit: Option<u32>,

    /// Retries of a user-initiated connect. `None` is unbounded.
    pub initial_retry_limit: Option<u32>,

    /// Keep the old connection alive during `reconnect()` until
    /// `acknowledge_successful_reconnect()` is called.
    pub overlap_manual_reconnect: bool,
}

impl Default for PersistentConnectionConfig {
    fn default() -> Self {
        Self {
            retry_limit: None,
            initial_retry_limit: Some(DEFAULT_INITIAL_RETRY_LIMIT),
            overlap_manual_reconnect: false,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl PersistentConnectionConfig {
    /// Creates a config with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget for automatic reconnects.
    #[inline]
    #[must_use]
    pub fn with_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Sets the retry budget for user-initiated connects.
    #[inline]
    #[must_use]
    pub fn with_initial_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.initial_retry_limit = limit;
        self
    }

    /// Enables overlapping manual reconnects.
    #[inline]
    #[must_use]
    pub fn with_overlap_manual_reconnect(mut self) -> Self {
        self.overlap_manual_reconnect = true;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
