//! Concrete transports.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐                         ┌─────────────────┐
//! │  Transport (Rust)   │      TCP / TLS          │  Line protocol  │
//! │                     │◄───────────────────────►│  server         │
//! │  event loop task    │   or WebSocket (ws/wss) │  (IRC, ...)     │
//! └─────────────────────┘                         └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `new` - Validate the target (fails fast with `Error::Config`)
//! 2. `open` - Dial, then spawn the event loop task
//! 3. Event loop - Feed received data to the core, write queued lines
//! 4. `close` - Ask the event loop to shut down and wait for it
//!
//! Dropping a transport drops its command sender, which also ends the
//! event loop.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `direct` | Raw TCP socket, optionally TLS |
//! | `websocket` | WebSocket client |

// ============================================================================
// Submodules
// ============================================================================

/// Raw TCP/TLS transport.
pub mod direct;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

// ============================================================================
// Re-exports
// ============================================================================

pub use direct::DirectConnection;
pub use websocket::WebSocketConnection;

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for a transport event loop.
pub(crate) enum TransportCommand {
    /// Write already-terminated data.
    Send(String),
    /// Close the channel, then acknowledge.
    Shutdown(oneshot::Sender<()>),
}

// ============================================================================
// CommandSlot
// ============================================================================

/// Sender half of the event loop's command channel.
///
/// Empty until the dial succeeds and again after close. The event loop
/// never holds a sender, so dropping the slot ends the loop.
#[derive(Default)]
pub(crate) struct CommandSlot {
    sender: Mutex<Option<mpsc::UnboundedSender<TransportCommand>>>,
}

impl CommandSlot {
    /// Stores the sender of a freshly spawned event loop.
    pub(crate) fn install(&self, sender: mpsc::UnboundedSender<TransportCommand>) {
        *self.sender.lock() = Some(sender);
    }

    /// Removes the sender, ending the event loop once dropped.
    pub(crate) fn take(&self) -> Option<mpsc::UnboundedSender<TransportCommand>> {
        self.sender.lock().take()
    }

    /// Queues data for the event loop. Dropped if there is none.
    pub(crate) fn send(&self, data: &str) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(tx) if tx.send(TransportCommand::Send(data.to_string())).is_ok() => {}
            _ => trace!(len = data.len(), "Dropping data without event loop"),
        }
    }

    /// Asks the event loop to shut down and waits for it to finish.
    pub(crate) async fn shutdown(&self) {
        let Some(sender) = self.take() else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if sender.send(TransportCommand::Shutdown(ack_tx)).is_ok() {
            // The loop may already have exited and dropped the ack.
            let _ = ack_rx.await;
        }
    }
}
