//! Shared connection state machine.
//!
//! [`ConnectionCore`] holds everything a transport has in common: lifecycle
//! state, the line framer, the event emitter and the guards that make
//! lifecycle notifications fire at most once per session.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Connecting ──► Connected ──► Closing ──► Closed
//!              │                                      ▲
//!              └──────────────── (failure) ───────────┘
//! ```
//!
//! A closed core is never reopened.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::event::{ConnectionEvent, EventEmitter};
use super::framer::LineFramer;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a single transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not yet connecting.
    Idle,
    /// Connect in progress.
    Connecting,
    /// Session established.
    Connected,
    /// Manual disconnect in progress.
    Closing,
    /// Torn down. Terminal.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionCore
// ============================================================================

/// Internal shared state for a transport instance.
struct CoreInner {
    /// Whether received data is split into lines.
    line_based: bool,
    /// Lifecycle state.
    state: Mutex<ConnectionState>,
    /// Partial-line buffer, scoped to this instance.
    framer: Mutex<LineFramer>,
    /// Lifecycle listeners.
    events: EventEmitter,
    /// Set once the caller asked for a disconnect.
    manual: AtomicBool,
    /// Set while a native handle exists.
    socket: AtomicBool,
    /// Set once the disconnect notification fired.
    finished: AtomicBool,
    /// Wakes an in-flight dial when the caller disconnects.
    abort: Notify,
}

/// Shared state machine embedded in every transport.
///
/// Cheap to clone; clones share state, so a transport can hand one to its
/// event loop task.
#[derive(Clone)]
pub struct ConnectionCore {
    inner: Arc<CoreInner>,
}

impl fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCore")
            .field("state", &self.state())
            .field("line_based", &self.inner.line_based)
            .field("has_socket", &self.has_socket())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionCore - Queries
// ============================================================================

impl ConnectionCore {
    /// Creates an idle core.
    #[must_use]
    pub fn new(line_based: bool) -> Self {
        Self {
            inner: Arc::new(CoreInner {
                line_based,
                state: Mutex::new(ConnectionState::Idle),
                framer: Mutex::new(LineFramer::new()),
                events: EventEmitter::new(),
                manual: AtomicBool::new(false),
                socket: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                abort: Notify::new(),
            }),
        }
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` while a connect is in progress.
    #[inline]
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Returns `true` while the session is established.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns `true` while a native handle exists.
    #[inline]
    #[must_use]
    pub fn has_socket(&self) -> bool {
        self.inner.socket.load(Ordering::Acquire)
    }

    /// Returns `true` once the caller requested a disconnect.
    #[inline]
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.inner.manual.load(Ordering::Acquire)
    }

    /// Returns `true` if data is split into lines.
    #[inline]
    #[must_use]
    pub fn is_line_based(&self) -> bool {
        self.inner.line_based
    }

    /// Returns the lifecycle listeners.
    #[inline]
    #[must_use]
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }
}

// ============================================================================
// ConnectionCore - Transitions
// ============================================================================

impl ConnectionCore {
    /// Moves from `Idle` to `Connecting`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyActive`] if connecting or connected
    /// - [`Error::ConnectionClosed`] if this instance was already used
    pub fn begin_connect(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            ConnectionState::Idle if !self.is_manual() => {
                *state = ConnectionState::Connecting;
                Ok(())
            }
            ConnectionState::Connecting | ConnectionState::Connected => Err(Error::AlreadyActive),
            _ => Err(Error::ConnectionClosed),
        }
    }

    /// Runs a dial future, bounded by `timeout` and cancelled by a manual
    /// disconnect.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the timeout elapses
    /// - [`Error::ConnectionClosed`] if the caller disconnected meanwhile
    /// - any error of `dial` itself
    pub async fn dial<T, F>(&self, timeout: Option<Duration>, dial: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_manual() {
            return Err(Error::ConnectionClosed);
        }

        let bounded = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, dial)
                    .await
                    .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))?,
                None => dial.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.inner.abort.notified() => Err(Error::ConnectionClosed),
            result = bounded => result,
        }
    }

    /// Moves to `Connected` and emits the connect notification.
    ///
    /// Returns `false` without emitting if the caller disconnected during
    /// the dial; the transport must then release its handle.
    pub fn mark_connected(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if self.is_manual() || *state != ConnectionState::Connecting {
                return false;
            }
            *state = ConnectionState::Connected;
        }
        self.inner.socket.store(true, Ordering::Release);

        debug!("Connection established");
        self.inner.events.emit(&ConnectionEvent::Connect);
        true
    }

    /// Records a caller-requested disconnect.
    ///
    /// Wakes a pending [`dial`](Self::dial) so it gives up immediately.
    pub fn request_manual(&self) {
        {
            let mut state = self.inner.state.lock();
            self.inner.manual.store(true, Ordering::Release);
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                *state = ConnectionState::Closing;
            }
        }
        self.inner.abort.notify_one();
    }

    /// Delivers received data as lines (or as a raw chunk).
    ///
    /// Ignored after the disconnect notification.
    pub fn receive_raw(&self, data: &[u8]) {
        if self.inner.finished.load(Ordering::Acquire) {
            trace!(len = data.len(), "Dropping data received after disconnect");
            return;
        }

        if !self.inner.line_based {
            let chunk = String::from_utf8_lossy(data).into_owned();
            self.inner.events.emit(&ConnectionEvent::Receive(chunk));
            return;
        }

        let lines = self.inner.framer.lock().push(data);
        for line in lines {
            trace!(%line, "Line received");
            self.inner.events.emit(&ConnectionEvent::Receive(line));
        }
    }

    /// Tears down the session and emits disconnect and end notifications.
    ///
    /// The manual flag is taken from [`request_manual`](Self::request_manual).
    /// A manual teardown never carries an error, so a dial aborted by the
    /// caller ends cleanly. Returns `false` if the session was already torn
    /// down; nothing is emitted twice.
    pub fn finish(&self, error: Option<Error>) -> bool {
        self.inner.socket.store(false, Ordering::Release);
        if !self.close_once() {
            return false;
        }

        let manual = self.is_manual();
        if manual && let Some(e) = &error {
            debug!(error = %e, "Discarding error of manual teardown");
        }
        let error = error.filter(|_| !manual).map(Arc::new);
        debug!(manual, error = ?error, "Connection closed");

        self.inner
            .events
            .emit(&ConnectionEvent::disconnect(manual, error.clone()));
        self.inner.events.emit(&ConnectionEvent::end(manual, error));
        true
    }

    /// Marks the session as lost without touching the native handle.
    ///
    /// Emits a non-manual disconnect notification unless one already fired.
    pub fn assume_disconnected(&self) {
        if !self.close_once() {
            return;
        }

        debug!("Assuming external disconnect");
        self.inner
            .events
            .emit(&ConnectionEvent::disconnect(false, None));
    }

    fn close_once(&self) -> bool {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.inner.state.lock() = ConnectionState::Closed;
        self.inner.framer.lock().clear();
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    fn recorder(core: &ConnectionCore) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        core.events().subscribe(move |event| {
            let entry = match event {
                ConnectionEvent::Receive(line) => format!("receive:{line}"),
                ConnectionEvent::Connect => "connect".to_string(),
                ConnectionEvent::Disconnect { manual, error } => {
                    format!("disconnect:{manual}:{}", error.is_some())
                }
                ConnectionEvent::End { manual, error } => {
                    format!("end:{manual}:{}", error.is_some())
                }
            };
            log_clone.lock().push(entry);
        });
        log
    }

    #[test]
    fn test_lifecycle_emits_once() {
        let core = ConnectionCore::new(true);
        let log = recorder(&core);

        core.begin_connect().expect("idle core");
        assert!(core.is_connecting());
        assert!(core.mark_connected());
        assert!(core.is_connected());
        assert!(core.has_socket());

        core.receive_raw(b"PING :x\r\n");
        assert!(core.finish(Some(Error::ConnectionClosed)));
        assert!(!core.finish(None));
        core.assume_disconnected();
        core.receive_raw(b"late\r\n");

        assert_eq!(
            *log.lock(),
            vec![
                "connect",
                "receive:PING :x",
                "disconnect:false:true",
                "end:false:true"
            ]
        );
        assert_eq!(core.state(), ConnectionState::Closed);
        assert!(!core.has_socket());
    }

    #[test]
    fn test_closed_core_is_not_reused() {
        let core = ConnectionCore::new(true);
        core.begin_connect().expect("idle core");
        assert!(matches!(core.begin_connect(), Err(Error::AlreadyActive)));
        core.finish(None);
        assert!(matches!(core.begin_connect(), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_manual_flag_reaches_notifications() {
        let core = ConnectionCore::new(true);
        let log = recorder(&core);

        core.begin_connect().expect("idle core");
        core.mark_connected();
        core.request_manual();
        assert_eq!(core.state(), ConnectionState::Closing);
        core.finish(None);

        assert_eq!(
            log.lock()[1..],
            ["disconnect:true:false".to_string(), "end:true:false".to_string()]
        );
    }

    #[test]
    fn test_mark_connected_refused_after_manual() {
        let core = ConnectionCore::new(true);
        let connects = Arc::new(AtomicUsize::new(0));
        let connects_clone = Arc::clone(&connects);
        core.events().on_connect(move || {
            connects_clone.fetch_add(1, Ordering::SeqCst);
        });

        core.begin_connect().expect("idle core");
        core.request_manual();
        assert!(!core.mark_connected());
        assert_eq!(connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_assume_disconnected_is_not_manual_and_skips_end() {
        let core = ConnectionCore::new(true);
        let log = recorder(&core);
        core.begin_connect().expect("idle core");
        core.mark_connected();

        core.assume_disconnected();
        assert!(!core.is_connected());
        assert!(!core.is_connecting());
        assert!(!core.finish(None));

        assert_eq!(log.lock()[1..], ["disconnect:false:false".to_string()]);
    }

    #[test]
    fn test_raw_mode_passes_chunks_through() {
        let core = ConnectionCore::new(false);
        let log = recorder(&core);
        core.receive_raw(b"no terminator");
        core.receive_raw(b"a\r\nb");
        assert_eq!(
            *log.lock(),
            vec!["receive:no terminator", "receive:a\r\nb"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dial_times_out() {
        let core = ConnectionCore::new(true);
        let result: Result<()> = core
            .dial(Some(Duration::from_secs(5)), std::future::pending())
            .await;
        assert!(matches!(result, Err(Error::ConnectionTimeout { timeout_ms: 5000 })));
    }

    #[tokio::test]
    async fn test_dial_aborted_by_manual_disconnect() {
        let core = ConnectionCore::new(true);
        core.begin_connect().expect("idle core");

        let dial_core = core.clone();
        let handle = tokio::spawn(async move {
            dial_core
                .dial::<(), _>(None, std::future::pending())
                .await
        });
        tokio::task::yield_now().await;
        core.request_manual();

        let result = handle.await.expect("task completes");
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_manual_teardown_drops_error() {
        let core = ConnectionCore::new(true);
        let log = recorder(&core);

        core.begin_connect().expect("idle core");
        core.request_manual();
        assert!(core.finish(Some(Error::ConnectionClosed)));

        assert_eq!(
            *log.lock(),
            vec!["disconnect:true:false", "end:true:false"]
        );
    }
}
