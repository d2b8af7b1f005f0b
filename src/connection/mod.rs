//! Connection abstraction shared by every transport.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────┐   blanket impl   ┌────────────────────────┐
//! │  Transport             │ ───────────────► │  Connection            │
//! │  (DirectConnection,    │                  │  connect / disconnect  │
//! │   WebSocketConnection) │                  │  send_line / events    │
//! └────────────────────────┘                  └────────────────────────┘
//!             │                                           ▲
//!             ▼                                           │
//!      ConnectionCore (state, LineFramer, EventEmitter)   │
//!                                                         │
//!                               PersistentConnection ─────┘
//! ```
//!
//! A [`Transport`] only knows how to dial, write raw data and close. The
//! blanket [`Connection`] impl adds line sanitization and the state queries
//! on top of its [`ConnectionCore`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Lifecycle state machine |
//! | `event` | Notifications and listeners |
//! | `framer` | Line framing and sanitization |
//! | `options` | Transport options |
//! | `target` | Connection destinations |

// ============================================================================
// Submodules
// ============================================================================

/// Lifecycle state machine.
pub mod core;

/// Lifecycle notifications and listener registration.
pub mod event;

/// Line framing and sanitization.
pub mod framer;

/// Options shared by every transport.
pub mod options;

/// Connection destinations.
pub mod target;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::trace;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{ConnectionCore, ConnectionState};
pub use event::{ConnectionEvent, EventEmitter, EventHandler, ListenerId};
pub use framer::{LINE_TERMINATOR, LineFramer, format_line};
pub use options::ConnectionOptions;
pub use target::{ConnectionTarget, TargetResolver, TargetSource};

// ============================================================================
// Connection
// ============================================================================

/// Uniform capability set of a line-protocol connection.
///
/// Implemented by every [`Transport`] and by
/// [`PersistentConnection`](crate::PersistentConnection).
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Returns `true` while a connect is in progress.
    fn is_connecting(&self) -> bool;

    /// Returns `true` while the session is established.
    fn is_connected(&self) -> bool;

    /// Returns `true` while a native handle exists.
    fn has_socket(&self) -> bool;

    /// Returns the lifecycle listeners.
    fn events(&self) -> &EventEmitter;

    /// Returns the remote host, if known.
    fn host(&self) -> Option<String>;

    /// Returns the remote port, if known.
    fn port(&self) -> Option<u16>;

    /// Connects.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented the connection. The same failure
    /// is also reported through the disconnect notification.
    async fn connect(&self) -> Result<()>;

    /// Disconnects. The resulting notifications carry `manual = true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the teardown itself fails.
    async fn disconnect(&self) -> Result<()>;

    /// Sends one protocol line.
    ///
    /// NUL, CR and LF are stripped and the line terminator is appended.
    /// Dropped silently when not connected.
    fn send_line(&self, line: &str);

    /// Treats the connection as lost through a channel not observed here.
    ///
    /// Fires a non-manual disconnect without touching the native handle.
    fn assume_external_disconnect(&self);
}

// ============================================================================
// Transport
// ============================================================================

/// A concrete channel to a remote endpoint.
///
/// Implementors must guarantee, through their [`ConnectionCore`]:
///
/// - at most one connect notification per successful `open`
/// - exactly one disconnect notification per torn-down session
/// - no receive notification after the disconnect notification
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Returns the shared state machine.
    fn core(&self) -> &ConnectionCore;

    /// Returns the remote host and port this transport dials.
    fn endpoint(&self) -> (&str, u16);

    /// Writes already-terminated data to the channel.
    fn send_raw(&self, data: &str);

    /// Dials the remote endpoint.
    ///
    /// # Errors
    ///
    /// Returns the dial failure after reporting it through
    /// [`ConnectionCore::finish`].
    async fn open(&self) -> Result<()>;

    /// Closes the channel, reporting a manual disconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the teardown itself fails.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T: Transport> Connection for T {
    fn is_connecting(&self) -> bool {
        self.core().is_connecting()
    }

    fn is_connected(&self) -> bool {
        self.core().is_connected()
    }

    fn has_socket(&self) -> bool {
        self.core().has_socket()
    }

    fn events(&self) -> &EventEmitter {
        self.core().events()
    }

    fn host(&self) -> Option<String> {
        Some(self.endpoint().0.to_string())
    }

    fn port(&self) -> Option<u16> {
        Some(self.endpoint().1)
    }

    async fn connect(&self) -> Result<()> {
        self.open().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.close().await
    }

    fn send_line(&self, line: &str) {
        if !self.core().is_connected() {
            trace!(%line, "Dropping line while not connected");
            return;
        }
        self.send_raw(&format_line(line));
    }

    fn assume_external_disconnect(&self) {
        self.core().assume_disconnected();
    }
}
