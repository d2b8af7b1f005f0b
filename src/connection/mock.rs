//! Scripted in-memory transport for engine tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};

use super::{ConnectionCore, ConnectionOptions, ConnectionTarget, Transport};

/// How the next dial behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockOutcome {
    /// Connects immediately.
    Succeed,
    /// Fails immediately.
    Fail,
    /// Never completes unless the caller disconnects.
    Hang,
}

/// Observation handle for one created transport.
#[derive(Debug, Clone)]
pub(crate) struct MockHandle {
    pub core: ConnectionCore,
    pub target: ConnectionTarget,
    pub created_at: Instant,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl MockHandle {
    /// Simulates the remote end dropping the session.
    pub fn drop_remote(&self) {
        self.core
            .finish(Some(Error::connection("connection reset by peer")));
    }

    /// Simulates data arriving from the remote end.
    pub fn deliver(&self, data: &[u8]) {
        self.core.receive_raw(data);
    }
}

/// Scripted network shared by every transport a test creates.
#[derive(Debug)]
pub(crate) struct MockNetwork {
    script: Mutex<VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    created: Mutex<Vec<MockHandle>>,
}

impl MockNetwork {
    /// Creates a network where every dial uses `fallback` once the script
    /// runs out.
    pub fn new(fallback: MockOutcome) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            created: Mutex::new(Vec::new()),
        })
    }

    /// Queues outcomes for the next dials.
    pub fn script(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.script.lock().extend(outcomes);
    }

    /// Returns a factory closure creating transports on this network.
    pub fn factory(
        self: &Arc<Self>,
    ) -> impl Fn(ConnectionTarget, ConnectionOptions) -> Result<MockConnection> + Send + Sync + 'static
    {
        let network = Arc::clone(self);
        move |target, options| Ok(MockConnection::new(Arc::clone(&network), target, options))
    }

    /// Number of transports created so far.
    pub fn created(&self) -> usize {
        self.created.lock().len()
    }

    /// Handle of the `index`-th created transport.
    pub fn instance(&self, index: usize) -> MockHandle {
        self.created.lock()[index].clone()
    }

    /// Gaps between consecutive transport creations, in whole seconds.
    pub fn gaps_secs(&self) -> Vec<u64> {
        let created = self.created.lock();
        created
            .windows(2)
            .map(|pair| (pair[1].created_at - pair[0].created_at).as_secs())
            .collect()
    }

    fn next_outcome(&self) -> MockOutcome {
        self.script
            .lock()
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// In-memory transport driven by a [`MockNetwork`].
#[derive(Debug)]
pub(crate) struct MockConnection {
    core: ConnectionCore,
    host: String,
    port: u16,
    network: Arc<MockNetwork>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockConnection {
    fn new(network: Arc<MockNetwork>, target: ConnectionTarget, options: ConnectionOptions) -> Self {
        let core = ConnectionCore::new(options.line_based);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let host = target.remote_host().unwrap_or_default();
        let port = target.remote_port().unwrap_or_default();
        network.created.lock().push(MockHandle {
            core: core.clone(),
            target,
            created_at: Instant::now(),
            sent: Arc::clone(&sent),
        });
        Self {
            core,
            host,
            port,
            network,
            sent,
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if self.core.has_socket() {
            self.core.finish(None);
        }
    }
}

#[async_trait]
impl Transport for MockConnection {
    fn core(&self) -> &ConnectionCore {
        &self.core
    }

    fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    fn send_raw(&self, data: &str) {
        self.sent.lock().push(data.to_string());
    }

    async fn open(&self) -> Result<()> {
        self.core.begin_connect()?;

        let result = match self.network.next_outcome() {
            MockOutcome::Succeed => Ok(()),
            MockOutcome::Fail => Err(Error::connection("connection refused")),
            MockOutcome::Hang => {
                self.core
                    .dial(None, std::future::pending::<Result<()>>())
                    .await
            }
        };

        if let Err(e) = result {
            self.core.finish(Some(e.replicate()));
            return Err(e);
        }
        if !self.core.mark_connected() {
            self.core.finish(None);
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.core.request_manual();
        if self.core.has_socket() {
            self.core.finish(None);
        }
        Ok(())
    }
}
