//! Error types for linesock.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use linesock::{Connection, Result};
//!
//! async fn example(conn: &impl Connection) -> Result<()> {
//!     conn.connect().await?;
//!     conn.send_line("PING :hello");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Lifecycle | [`Error::AlreadyActive`], [`Error::ExhaustedRetries`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | External | [`Error::Io`], [`Error::Tls`], [`Error::WebSocket`] |
//!
//! Manual disconnects are never errors. They are reported through the
//! `manual` flag of [`ConnectionEvent`](crate::ConnectionEvent) instead.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned synchronously when a connection target or option set is
    /// malformed (missing host, unparsable URL, ...).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// A connection is already established or being established.
    ///
    /// Returned by `connect()` without touching any state.
    #[error("Connection already present")]
    AlreadyActive,

    /// Every attempt of a connect cycle failed.
    #[error("Connection failed after trying {attempts} times")]
    ExhaustedRetries {
        /// Retry budget that was consumed.
        attempts: u32,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection failed.
    ///
    /// Returned when the remote end cannot be reached or closes abnormally.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed before it could be used.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an exhausted retries error.
    #[inline]
    pub fn exhausted_retries(attempts: u32) -> Self {
        Self::ExhaustedRetries { attempts }
    }

    /// Returns an equivalent error.
    ///
    /// External errors are not `Clone`; they keep their kind (IO) or
    /// message (TLS, WebSocket).
    #[must_use]
    pub(crate) fn replicate(&self) -> Self {
        match self {
            Self::Config { message } => Self::config(message.clone()),
            Self::AlreadyActive => Self::AlreadyActive,
            Self::ExhaustedRetries { attempts } => Self::exhausted_retries(*attempts),
            Self::Connection { message } => Self::connection(message.clone()),
            Self::ConnectionTimeout { timeout_ms } => Self::connection_timeout(*timeout_ms),
            Self::ConnectionClosed => Self::ConnectionClosed,
            Self::Io(e) => Self::Io(IoError::new(e.kind(), e.to_string())),
            Self::Tls(e) => Self::connection(format!("TLS error: {e}")),
            Self::WebSocket(e) => Self::connection(format!("WebSocket error: {e}")),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Io(_)
                | Self::Tls(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on a later attempt.
    /// [`PersistentConnection`](crate::PersistentConnection) retries every
    /// failed attempt regardless, until its retry budget runs out.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_connection_error()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("refused");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing host name");
        assert_eq!(err.to_string(), "Configuration error: missing host name");
        assert!(err.is_config_error());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_exhausted_retries_display() {
        let err = Error::exhausted_retries(3);
        assert_eq!(err.to_string(), "Connection failed after trying 3 times");
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_already_active_display() {
        assert_eq!(
            Error::AlreadyActive.to_string(),
            "Connection already present"
        );
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let timeout_err = Error::connection_timeout(1000);
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(timeout_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_replicate_keeps_kind() {
        let err = Error::Io(IoError::new(ErrorKind::ConnectionReset, "reset"));
        match err.replicate() {
            Error::Io(copy) => assert_eq!(copy.kind(), ErrorKind::ConnectionReset),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            Error::exhausted_retries(4).replicate(),
            Error::ExhaustedRetries { attempts: 4 }
        ));
    }
}
