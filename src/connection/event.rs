//! Lifecycle notifications and listener registration.
//!
//! Every connection owns one [`EventEmitter`]. Listeners are plain callbacks
//! invoked synchronously, in registration order, on the task that produced
//! the event.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::Error;

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
pub type EventHandler = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

// ============================================================================
// ConnectionEvent
// ============================================================================

/// A lifecycle notification emitted by a connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A complete protocol line (or a raw chunk when not line based).
    Receive(String),

    /// The connection is established.
    Connect,

    /// The session was torn down.
    Disconnect {
        /// `true` if the caller requested the disconnect.
        manual: bool,
        /// Failure that caused the disconnect, if any.
        error: Option<Arc<Error>>,
    },

    /// No further activity will happen on this connection.
    End {
        /// `true` if the caller requested the disconnect.
        manual: bool,
        /// Failure that ended the connection, if any.
        error: Option<Arc<Error>>,
    },
}

impl ConnectionEvent {
    /// Creates a disconnect event.
    #[inline]
    #[must_use]
    pub fn disconnect(manual: bool, error: Option<Arc<Error>>) -> Self {
        Self::Disconnect { manual, error }
    }

    /// Creates an end event.
    #[inline]
    #[must_use]
    pub fn end(manual: bool, error: Option<Arc<Error>>) -> Self {
        Self::End { manual, error }
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Handle returned by listener registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Registry of lifecycle listeners.
#[derive(Default)]
pub struct EventEmitter {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, EventHandler)>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventEmitter {
    /// Creates an emitter with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for every event kind.
    pub fn subscribe<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(handler)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Registers a listener for received lines.
    pub fn on_receive<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Receive(line) = event {
                handler(line);
            }
        })
    }

    /// Registers a listener for successful connects.
    pub fn on_connect<F>(&self, handler: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if matches!(event, ConnectionEvent::Connect) {
                handler();
            }
        })
    }

    /// Registers a listener for disconnects.
    ///
    /// The handler receives the manual flag and the error, if any.
    pub fn on_disconnect<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(bool, Option<&Error>) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::Disconnect { manual, error } = event {
                handler(*manual, error.as_deref());
            }
        })
    }

    /// Registers a listener for the end of a connection.
    pub fn on_end<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(bool, Option<&Error>) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let ConnectionEvent::End { manual, error } = event {
                handler(*manual, error.as_deref());
            }
        })
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Delivers an event to every listener.
    ///
    /// The listener list is snapshotted first, so handlers may subscribe,
    /// unsubscribe or emit again without deadlocking.
    pub fn emit(&self, event: &ConnectionEvent) {
        let handlers: Vec<EventHandler> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
