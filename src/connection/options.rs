//! Options shared by every transport.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use linesock::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_connect_timeout(Duration::from_secs(10))
//!     .with_accept_invalid_certs();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Transport options passed through the persistent engine unchanged.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Split received data into lines. When `false`, raw chunks are
    /// delivered as they arrive.
    pub line_based: bool,

    /// Time allowed for a single connect attempt. `None` waits forever.
    pub connect_timeout: Option<Duration>,

    /// Accept TLS certificates that fail verification.
    pub accept_invalid_certs: bool,

    /// WebSocket protocol settings.
    pub websocket_config: Option<WebSocketConfig>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            line_based: true,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            accept_invalid_certs: false,
            websocket_config: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables line framing.
    #[inline]
    #[must_use]
    pub fn with_line_based(mut self, line_based: bool) -> Self {
        self.line_based = line_based;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Disables the connect timeout.
    #[inline]
    #[must_use]
    pub fn without_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// Accepts invalid TLS certificates. Only meant for testing.
    #[inline]
    #[must_use]
    pub fn with_accept_invalid_certs(mut self) -> Self {
        self.accept_invalid_certs = true;
        self
    }

    /// Sets WebSocket protocol settings.
    #[inline]
    #[must_use]
    pub fn with_websocket_config(mut self, config: WebSocketConfig) -> Self {
        self.websocket_config = Some(config);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
