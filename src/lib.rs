//! Linesock - Auto-reconnecting line-protocol connections.
//!
//! This library connects to text line protocols (IRC and friends) over a
//! raw TCP socket, TLS, or a WebSocket, and keeps the session alive across
//! network failures.
//!
//! # Architecture
//!
//! - **Transports**: [`DirectConnection`] and [`WebSocketConnection`] each
//!   own one native handle and one event loop task
//! - **Engine**: [`PersistentConnection`] creates a fresh transport per
//!   attempt and retries with a bounded Fibonacci backoff
//!
//! Both sides implement [`Connection`], so application code does not care
//! which one it holds.
//!
//! # Quick Start
//!
//! ```no_run
//! use linesock::{Connection, ConnectionTarget, DirectConnection, PersistentConnection, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let conn = PersistentConnection::builder(DirectConnection::new)
//!         .target(ConnectionTarget::host("irc.libera.chat", 6697))
//!         .build()?;
//!
//!     conn.events().on_receive(|line| println!("<< {line}"));
//!     conn.connect().await?;
//!
//!     conn.send_line("NICK linesock");
//!     conn.send_line("USER linesock 0 * :linesock");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backoff`] | Reconnect delay sequence |
//! | [`connection`] | [`Connection`] trait, line framing, events |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`persistent`] | Auto-reconnecting engine |
//! | [`transport`] | TCP/TLS and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Reconnect delay sequence.
pub mod backoff;

/// Connection abstraction shared by every transport.
///
/// - [`Connection`] - Uniform capability set
/// - [`Transport`] - What a concrete channel implements
/// - [`LineFramer`](connection::LineFramer) - Splits received data into lines
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Auto-reconnecting engine.
///
/// Use [`PersistentConnection::builder()`] to create one.
pub mod persistent;

/// Concrete transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Backoff
pub use backoff::{Backoff, MAX_DELAY};

// Connection types
pub use connection::{
    Connection, ConnectionEvent, ConnectionOptions, ConnectionState, ConnectionTarget,
    EventEmitter, ListenerId, TargetSource, Transport,
};

// Error types
pub use error::{Error, Result};

// Engine types
pub use persistent::{
    ConnectionFactory, PersistentConnection, PersistentConnectionBuilder,
    PersistentConnectionConfig,
};

// Transport types
pub use transport::{DirectConnection, WebSocketConnection};
