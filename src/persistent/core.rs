//! Auto-reconnecting connection engine.
//!
//! [`PersistentConnection`] wraps a fresh transport per attempt and keeps the
//! session alive across failures.
//!
//! # Retry Cycles
//!
//! | Cycle | Started by | Budget |
//! |-------|------------|--------|
//! | Initial | [`connect`](Connection::connect), [`reconnect`](PersistentConnection::reconnect) | `initial_retry_limit` |
//! | Steady state | a non-manual drop of an established session | `retry_limit` |
//!
//! The first attempt of a cycle runs immediately. Each retry waits for the
//! next Fibonacci delay (0s, 1s, 1s, 2s, 3s, 5s, ... capped at 120s). When
//! the budget runs out the engine emits one end notification carrying
//! [`Error::ExhaustedRetries`].
//!
//! # Overlapping Reconnects
//!
//! With `overlap_manual_reconnect`, [`reconnect`](PersistentConnection::reconnect)
//! keeps the established transport open next to the new one. Lines from
//! both are delivered until
//! [`acknowledge_successful_reconnect`](PersistentConnection::acknowledge_successful_reconnect)
//! closes the old one.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::connection::{
    Connection, ConnectionEvent, ConnectionOptions, ConnectionTarget, EventEmitter, ListenerId,
    TargetSource,
};
use crate::error::{Error, Result};

use super::builder::PersistentConnectionBuilder;
use super::config::PersistentConnectionConfig;
use super::factory::ConnectionFactory;
use super::retry::RetryState;

// ============================================================================
// Slot
// ============================================================================

/// A transport owned by the engine plus its forwarding listener.
struct Slot<C> {
    id: u64,
    conn: Arc<C>,
    listener: ListenerId,
}

impl<C> Clone for Slot<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            conn: Arc::clone(&self.conn),
            listener: self.listener,
        }
    }
}

impl<C: Connection> Slot<C> {
    /// Stops forwarding this transport's notifications.
    fn detach(&self) {
        self.conn.events().unsubscribe(self.listener);
    }

    /// Detaches and closes the transport without notifying listeners.
    async fn release(self) {
        self.detach();
        if let Err(e) = self.conn.disconnect().await {
            debug!(error = %e, "Failed to close released connection");
        }
    }
}

/// Which engine slot a notification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Current,
    Previous,
    Detached,
}

/// What to do with a transport's disconnect notification.
enum DisconnectAction {
    Ignore,
    Forward,
    End,
    Reconnect(u64),
}

/// Result of a failed attempt.
enum AttemptOutcome {
    Cancelled,
    Exhausted(u32),
    Retry(Duration),
}

// ============================================================================
// EngineState
// ============================================================================

/// Mutable engine state, guarded by one lock.
struct EngineState<C> {
    /// A cycle is running (attempting or waiting).
    connecting: bool,
    /// The active transport.
    current: Option<Slot<C>>,
    /// Transport kept open during an overlapping reconnect.
    previous: Option<Slot<C>>,
    /// Budget and backoff of the running cycle.
    retry: RetryState,
    /// Last slot id handed out.
    last_slot: u64,
    /// Runtime of the last `connect`, used for automatic reconnects.
    runtime: Option<Handle>,
}

impl<C> EngineState<C> {
    fn new() -> Self {
        Self {
            connecting: false,
            current: None,
            previous: None,
            retry: RetryState::default(),
            last_slot: 0,
            runtime: None,
        }
    }

    fn role(&self, id: u64) -> Role {
        if self.current.as_ref().is_some_and(|slot| slot.id == id) {
            Role::Current
        } else if self.previous.as_ref().is_some_and(|slot| slot.id == id) {
            Role::Previous
        } else {
            Role::Detached
        }
    }

    fn begin_cycle(&mut self, limit: Option<u32>) -> u64 {
        self.connecting = true;
        self.retry.begin(limit)
    }

    fn is_cycle_active(&self, cycle: u64) -> bool {
        self.connecting && self.retry.cycle == cycle
    }

    fn finish_cycle(&mut self, cycle: u64) {
        if self.retry.cycle == cycle {
            self.connecting = false;
            self.retry.backoff = None;
        }
    }

    fn take_current_if(&mut self, id: u64) -> Option<Slot<C>> {
        if self.role(id) == Role::Current {
            self.current.take()
        } else {
            None
        }
    }
}

// ============================================================================
// EngineInner
// ============================================================================

/// Internal shared state for the engine.
struct EngineInner<F: ConnectionFactory> {
    factory: F,
    target: TargetSource,
    options: ConnectionOptions,
    config: PersistentConnectionConfig,
    state: Mutex<EngineState<F::Connection>>,
    events: EventEmitter,
}

impl<F: ConnectionFactory> EngineInner<F> {
    /// Runs attempts until one succeeds, the budget runs out or the cycle
    /// is superseded.
    async fn run_cycle(self: Arc<Self>, cycle: u64) -> Result<()> {
        loop {
            let slot = match self.start_attempt(cycle) {
                Ok(Some(slot)) => slot,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "Cannot create connection");
                    self.state.lock().finish_cycle(cycle);
                    self.events
                        .emit(&ConnectionEvent::end(false, Some(Arc::new(e.replicate()))));
                    return Err(e);
                }
            };

            let result = slot.conn.connect().await;
            let error = match result {
                Ok(()) => {
                    let superseded = self.state.lock().role(slot.id) != Role::Current;
                    if superseded {
                        debug!("Connect cycle superseded, closing orphaned connection");
                        slot.release().await;
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            let (outcome, failed) = {
                let mut state = self.state.lock();
                let failed = state.take_current_if(slot.id);
                let outcome = if !state.is_cycle_active(cycle) {
                    AttemptOutcome::Cancelled
                } else if state.retry.is_exhausted() {
                    state.finish_cycle(cycle);
                    AttemptOutcome::Exhausted(state.retry.attempts)
                } else {
                    AttemptOutcome::Retry(state.retry.next_delay())
                };
                (outcome, failed)
            };
            drop(failed);
            slot.detach();

            match outcome {
                AttemptOutcome::Cancelled => {
                    debug!(error = %error, "Connect cycle cancelled");
                    return Ok(());
                }

                AttemptOutcome::Exhausted(attempts) => {
                    warn!(attempts, error = %error, "Giving up on connecting");
                    self.events.emit(&ConnectionEvent::end(
                        false,
                        Some(Arc::new(Error::exhausted_retries(attempts))),
                    ));
                    return Err(Error::exhausted_retries(attempts));
                }

                AttemptOutcome::Retry(delay) => {
                    if !delay.is_zero() {
                        info!(
                            error = %error,
                            "Retrying in {} seconds",
                            delay.as_secs()
                        );
                    }
                    tokio::time::sleep(delay).await;

                    let active = self.state.lock().is_cycle_active(cycle);
                    if !active {
                        debug!("Connect cycle cancelled during backoff");
                        return Ok(());
                    }
                    info!("Trying to reconnect");
                }
            }
        }
    }

    /// Creates a transport, wires its notifications and makes it current.
    ///
    /// Returns `None` if the cycle was cancelled meanwhile.
    fn start_attempt(self: &Arc<Self>, cycle: u64) -> Result<Option<Slot<F::Connection>>> {
        let target = self.target.resolve()?;
        debug!(destination = %target, "Creating connection");
        let conn = Arc::new(self.factory.create(target, self.options.clone())?);

        let mut state = self.state.lock();
        if !state.is_cycle_active(cycle) {
            return Ok(None);
        }

        state.last_slot += 1;
        let id = state.last_slot;
        let engine = Arc::downgrade(self);
        let listener = conn.events().subscribe(move |event| {
            if let Some(engine) = engine.upgrade() {
                engine.handle_event(id, event);
            }
        });

        let slot = Slot { id, conn, listener };
        state.current = Some(slot.clone());
        Ok(Some(slot))
    }

    fn handle_event(self: &Arc<Self>, slot_id: u64, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Receive(_) => {
                let role = self.state.lock().role(slot_id);
                if role != Role::Detached {
                    self.events.emit(event);
                }
            }
            ConnectionEvent::Connect => self.handle_connect(slot_id),
            ConnectionEvent::Disconnect { manual, error } => {
                self.handle_disconnect(slot_id, *manual, error.clone());
            }
            // The engine decides on its own when it ends.
            ConnectionEvent::End { .. } => {}
        }
    }

    fn handle_connect(&self, slot_id: u64) {
        {
            let mut state = self.state.lock();
            if state.role(slot_id) != Role::Current {
                return;
            }
            info!(retries = state.retry.attempts, "Connected");
            state.connecting = false;
            state.retry.succeed();
        }
        self.events.emit(&ConnectionEvent::Connect);
    }

    fn handle_disconnect(self: &Arc<Self>, slot_id: u64, manual: bool, error: Option<Arc<Error>>) {
        let mut released = Vec::new();
        let (action, runtime) = {
            let mut state = self.state.lock();
            let runtime = state.runtime.clone();
            let action = match state.role(slot_id) {
                Role::Previous => {
                    debug!("Previous connection closed");
                    released.extend(state.previous.take());
                    DisconnectAction::Ignore
                }
                role if manual => {
                    if role == Role::Current {
                        released.extend(state.current.take());
                    }
                    DisconnectAction::End
                }
                Role::Detached => DisconnectAction::Ignore,
                Role::Current => {
                    // A pending previous connection must not outlive a
                    // failed replacement.
                    released.extend(state.previous.take());
                    if state.connecting {
                        DisconnectAction::Forward
                    } else {
                        released.extend(state.current.take());
                        DisconnectAction::Reconnect(state.begin_cycle(self.config.retry_limit))
                    }
                }
            };
            (action, runtime)
        };

        for slot in &released {
            slot.detach();
        }
        drop(released);

        match action {
            DisconnectAction::Ignore => {}

            DisconnectAction::Forward => {
                self.events
                    .emit(&ConnectionEvent::disconnect(manual, error));
            }

            DisconnectAction::End => {
                if let Some(e) = error {
                    debug!(error = %e, "Ignoring error of manual disconnect");
                }
                self.events.emit(&ConnectionEvent::disconnect(true, None));
                self.events.emit(&ConnectionEvent::end(true, None));
            }

            DisconnectAction::Reconnect(cycle) => {
                warn!(error = ?error, "Connection lost, reconnecting");
                self.events
                    .emit(&ConnectionEvent::disconnect(false, error.clone()));

                // Notifications may arrive on threads outside the runtime.
                let Some(runtime) = runtime.or_else(|| Handle::try_current().ok()) else {
                    warn!("No tokio runtime available, giving up on reconnecting");
                    self.state.lock().finish_cycle(cycle);
                    self.events.emit(&ConnectionEvent::end(false, error));
                    return;
                };

                let engine = Arc::clone(self);
                runtime.spawn(async move {
                    if let Err(e) = engine.run_cycle(cycle).await {
                        debug!(error = %e, "Automatic reconnect stopped");
                    }
                });
            }
        }
    }
}

// ============================================================================
// PersistentConnection
// ============================================================================

/// Connection that survives transport failures.
///
/// Implements [`Connection`], so it can be used wherever a plain transport
/// is accepted. Cheap to clone; clones share the same session.
///
/// # Examples
///
/// ```no_run
/// use linesock::{Connection, ConnectionTarget, DirectConnection, PersistentConnection};
///
/// # async fn example() -> linesock::Result<()> {
/// let conn = PersistentConnection::builder(DirectConnection::new)
///     .target(ConnectionTarget::host("irc.libera.chat", 6697))
///     .build()?;
///
/// conn.events().on_receive(|line| println!("<< {line}"));
/// conn.connect().await?;
/// conn.send_line("NICK linesock");
/// # Ok(())
/// # }
/// ```
pub struct PersistentConnection<F: ConnectionFactory> {
    inner: Arc<EngineInner<F>>,
}

impl<F: ConnectionFactory> Clone for PersistentConnection<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PersistentConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentConnection")
            .field("target", &self.inner.target)
            .field("config", &self.inner.config)
            .field("is_connected", &self.is_connected())
            .field("is_connecting", &self.is_connecting())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PersistentConnection - Construction
// ============================================================================

impl<F: ConnectionFactory> PersistentConnection<F> {
    /// Creates a builder around a transport factory.
    #[inline]
    #[must_use]
    pub fn builder(factory: F) -> PersistentConnectionBuilder<F> {
        PersistentConnectionBuilder::new(factory)
    }

    /// Creates an engine without connecting.
    #[must_use]
    pub fn new(
        factory: F,
        target: impl Into<TargetSource>,
        options: ConnectionOptions,
        config: PersistentConnectionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                factory,
                target: target.into(),
                options,
                config,
                state: Mutex::new(EngineState::new()),
                events: EventEmitter::new(),
            }),
        }
    }

    /// Returns the retry policy.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PersistentConnectionConfig {
        &self.inner.config
    }

    /// Returns the options handed to every transport.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Returns the active transport, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<F::Connection>> {
        self.inner
            .state
            .lock()
            .current
            .as_ref()
            .map(|slot| Arc::clone(&slot.conn))
    }

    /// Returns `true` while an overlapped transport awaits acknowledgement.
    #[must_use]
    pub fn has_pending_previous(&self) -> bool {
        self.inner.state.lock().previous.is_some()
    }
}

// ============================================================================
// PersistentConnection - Reconnect
// ============================================================================

impl<F: ConnectionFactory> PersistentConnection<F> {
    /// Replaces the session with a fresh one.
    ///
    /// Without overlap this is a manual disconnect followed by
    /// [`connect`](Connection::connect). With overlap an established session
    /// stays open until
    /// [`acknowledge_successful_reconnect`](Self::acknowledge_successful_reconnect).
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Connection::connect).
    pub async fn reconnect(&self) -> Result<()> {
        if self.inner.config.overlap_manual_reconnect {
            let (overlapped, displaced) = {
                let mut state = self.inner.state.lock();
                let established = !state.connecting
                    && state
                        .current
                        .as_ref()
                        .is_some_and(|slot| slot.conn.is_connected());
                if established {
                    let current = state.current.take();
                    (true, std::mem::replace(&mut state.previous, current))
                } else {
                    (false, None)
                }
            };

            if let Some(displaced) = displaced {
                displaced.release().await;
            }
            if overlapped {
                info!("Reconnecting, previous connection stays open");
                return self.connect().await;
            }
        }

        self.disconnect().await?;
        self.connect().await
    }

    /// Closes the transport kept open by an overlapping reconnect.
    ///
    /// The close is silent: no disconnect or end notification is emitted.
    pub async fn acknowledge_successful_reconnect(&self) {
        let previous = self.inner.state.lock().previous.take();
        if let Some(previous) = previous {
            debug!("Closing previous connection");
            previous.release().await;
        }
    }
}

// ============================================================================
// Connection Implementation
// ============================================================================

#[async_trait]
impl<F: ConnectionFactory> Connection for PersistentConnection<F> {
    fn is_connecting(&self) -> bool {
        let state = self.inner.state.lock();
        match &state.current {
            Some(slot) => slot.conn.is_connecting(),
            None => state.connecting,
        }
    }

    fn is_connected(&self) -> bool {
        let state = self.inner.state.lock();
        state
            .current
            .as_ref()
            .is_some_and(|slot| slot.conn.is_connected())
    }

    fn has_socket(&self) -> bool {
        let state = self.inner.state.lock();
        state
            .current
            .as_ref()
            .is_some_and(|slot| slot.conn.has_socket())
    }

    fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    /// Host of the active transport, else of the fixed target.
    ///
    /// `None` for a resolver-backed target with no active transport.
    fn host(&self) -> Option<String> {
        self.current()
            .and_then(|conn| conn.host())
            .or_else(|| self.inner.target.fixed().and_then(ConnectionTarget::remote_host))
    }

    /// Port of the active transport, else of the fixed target.
    fn port(&self) -> Option<u16> {
        self.current()
            .and_then(|conn| conn.port())
            .or_else(|| self.inner.target.fixed().and_then(ConnectionTarget::remote_port))
    }

    /// Starts an initial cycle and waits for its outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyActive`] if connected or a cycle is running
    /// - [`Error::ExhaustedRetries`] if every attempt failed
    /// - [`Error::Config`] if the target or transport is misconfigured
    async fn connect(&self) -> Result<()> {
        let cycle = {
            let mut state = self.inner.state.lock();
            if state.current.is_some() || state.connecting {
                return Err(Error::AlreadyActive);
            }
            if let Ok(runtime) = Handle::try_current() {
                state.runtime = Some(runtime);
            }
            state.begin_cycle(self.inner.config.initial_retry_limit)
        };

        info!(destination = ?self.inner.target, "Connecting");
        Arc::clone(&self.inner).run_cycle(cycle).await
    }

    /// Stops any running cycle and closes the active transport.
    async fn disconnect(&self) -> Result<()> {
        let (current, previous) = {
            let mut state = self.inner.state.lock();
            state.connecting = false;
            (state.current.take(), state.previous.take())
        };

        if let Some(previous) = previous {
            previous.release().await;
        }

        match current {
            Some(slot) => {
                info!("Disconnecting");
                slot.conn.disconnect().await
            }
            None => Ok(()),
        }
    }

    fn send_line(&self, line: &str) {
        let current = self.current();
        match current {
            Some(conn) => conn.send_line(line),
            None => debug!(%line, "Dropping line, no active connection"),
        }
    }

    fn assume_external_disconnect(&self) {
        if let Some(conn) = self.current() {
            conn.assume_external_disconnect();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
