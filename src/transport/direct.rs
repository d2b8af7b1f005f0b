//! Raw TCP socket transport, optionally wrapped in TLS.
//!
//! # Example
//!
//! ```ignore
//! use linesock::{Connection, ConnectionOptions, ConnectionTarget, DirectConnection};
//!
//! let conn = DirectConnection::new(
//!     ConnectionTarget::host("irc.libera.chat", 6697),
//!     ConnectionOptions::new(),
//! )?;
//! conn.events().on_receive(|line| println!("<< {line}"));
//! conn.connect().await?;
//! conn.send_line("NICK linesock");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_native_tls::TlsStream;
use tracing::{debug, trace, warn};

use crate::connection::{ConnectionCore, ConnectionOptions, ConnectionTarget, Transport};
use crate::error::{Error, Result};

use super::{CommandSlot, TransportCommand};

// ============================================================================
// Constants
// ============================================================================

/// Port used for TLS connections without an explicit port.
pub const DEFAULT_SECURE_PORT: u16 = 6697;

/// Port used for plaintext connections without an explicit port.
pub const DEFAULT_PLAIN_PORT: u16 = 6667;

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 4096;

// ============================================================================
// DirectStream
// ============================================================================

/// A dialed socket, before the event loop takes it over.
enum DirectStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

// ============================================================================
// DirectConnection
// ============================================================================

/// Line-protocol connection over a TCP socket.
pub struct DirectConnection {
    /// Shared state machine.
    core: ConnectionCore,
    /// Remote host name.
    hostname: String,
    /// Remote port.
    port: u16,
    /// Whether TLS is used.
    secure: bool,
    /// Transport options.
    options: ConnectionOptions,
    /// Command channel of the running event loop.
    commands: CommandSlot,
}

impl fmt::Debug for DirectConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectConnection")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("state", &self.core.state())
            .finish_non_exhaustive()
    }
}

impl DirectConnection {
    /// Creates an unconnected transport.
    ///
    /// The port defaults to [`DEFAULT_SECURE_PORT`] or [`DEFAULT_PLAIN_PORT`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the target has no host name.
    pub fn new(target: ConnectionTarget, options: ConnectionOptions) -> Result<Self> {
        let hostname = target.require_hostname()?.to_string();
        let port = target.port.unwrap_or(if target.secure {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PLAIN_PORT
        });

        Ok(Self {
            core: ConnectionCore::new(options.line_based),
            hostname,
            port,
            secure: target.secure,
            options,
            commands: CommandSlot::default(),
        })
    }

    /// Returns the remote host name.
    #[inline]
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the remote port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` if TLS is used.
    #[inline]
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Opens the TCP socket and, if secure, runs the TLS handshake.
    async fn dial(&self) -> Result<DirectStream> {
        let tcp = TcpStream::connect((self.hostname.as_str(), self.port)).await?;
        tcp.set_nodelay(true)?;

        if !self.secure {
            return Ok(DirectStream::Plain(tcp));
        }

        let mut builder = native_tls::TlsConnector::builder();
        if self.options.accept_invalid_certs {
            builder.danger_accept_invalid_certs(true);
        }
        let connector = tokio_native_tls::TlsConnector::from(builder.build()?);
        let tls = connector.connect(&self.hostname, tcp).await?;

        Ok(DirectStream::Tls(Box::new(tls)))
    }

    /// Event loop that handles socket I/O.
    async fn run_event_loop<S>(
        stream: S,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        core: ConnectionCore,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut shutdown_ack = None;

        let error = loop {
            tokio::select! {
                // Incoming data from the server
                read = reader.read(&mut buffer) => {
                    match read {
                        Ok(0) => {
                            debug!("Socket closed by remote");
                            break None;
                        }
                        Ok(len) => core.receive_raw(&buffer[..len]),
                        Err(e) => {
                            warn!(error = %e, "Socket read failed");
                            break Some(Error::Io(e));
                        }
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(data)) => {
                            if let Err(e) = writer.write_all(data.as_bytes()).await {
                                warn!(error = %e, "Socket write failed");
                                break Some(Error::Io(e));
                            }
                            trace!(len = data.len(), "Data sent");
                        }

                        Some(TransportCommand::Shutdown(ack)) => {
                            debug!("Shutdown command received");
                            let _ = writer.shutdown().await;
                            shutdown_ack = Some(ack);
                            break None;
                        }

                        None => {
                            debug!("Command channel closed");
                            break None;
                        }
                    }
                }
            }
        };

        core.finish(error);
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }

        debug!("Event loop terminated");
    }
}

#[async_trait]
impl Transport for DirectConnection {
    fn core(&self) -> &ConnectionCore {
        &self.core
    }

    fn endpoint(&self) -> (&str, u16) {
        (self.hostname(), self.port())
    }

    fn send_raw(&self, data: &str) {
        self.commands.send(data);
    }

    async fn open(&self) -> Result<()> {
        self.core.begin_connect()?;
        debug!(
            host = %self.hostname,
            port = self.port,
            secure = self.secure,
            "Opening socket"
        );

        let stream = match self
            .core
            .dial(self.options.connect_timeout, self.dial())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                debug!(error = %e, "Socket connect failed");
                self.core.finish(Some(e.replicate()));
                return Err(e);
            }
        };

        // Lines sent from connect listeners queue up until the loop runs.
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.commands.install(command_tx);
        if !self.core.mark_connected() {
            drop(self.commands.take());
            self.core.finish(None);
            return Err(Error::ConnectionClosed);
        }

        let core = self.core.clone();
        match stream {
            DirectStream::Plain(s) => {
                tokio::spawn(Self::run_event_loop(s, command_rx, core));
            }
            DirectStream::Tls(s) => {
                tokio::spawn(Self::run_event_loop(s, command_rx, core));
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(host = %self.hostname, port = self.port, "Closing socket");
        self.core.request_manual();
        self.commands.shutdown().await;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::connection::{Connection, ConnectionEvent};

    async fn listener() -> (TcpListener, ConnectionTarget) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        let target = ConnectionTarget::host("127.0.0.1", port).with_secure(false);
        (listener, target)
    }

    fn forward_events(conn: &DirectConnection) -> UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        conn.events().subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    #[test]
    fn test_default_ports() {
        let secure = DirectConnection::new(
            ConnectionTarget {
                hostname: Some("irc.example.org".into()),
                port: None,
                secure: true,
                url: None,
            },
            ConnectionOptions::new(),
        )
        .expect("valid target");
        assert_eq!(secure.port(), DEFAULT_SECURE_PORT);

        let plain = DirectConnection::new(
            ConnectionTarget {
                hostname: Some("irc.example.org".into()),
                port: None,
                secure: false,
                url: None,
            },
            ConnectionOptions::new(),
        )
        .expect("valid target");
        assert_eq!(plain.port(), DEFAULT_PLAIN_PORT);
        assert_eq!(Connection::port(&plain), Some(DEFAULT_PLAIN_PORT));
        assert_eq!(Connection::host(&plain).as_deref(), Some("irc.example.org"));
    }

    #[test]
    fn test_missing_host_fails_fast() {
        let result = DirectConnection::new(
            ConnectionTarget::url("wss://example.org"),
            ConnectionOptions::new(),
        );
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_send_and_receive_lines() {
        let (listener, target) = listener().await;
        let conn = DirectConnection::new(target, ConnectionOptions::new()).expect("valid");
        let mut events = forward_events(&conn);

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            let received = lines.next_line().await.expect("read").expect("line");
            write
                .write_all(b":server 001 nick :Wel")
                .await
                .expect("write");
            write.write_all(b"come\r\nPING :x\r\n").await.expect("write");
            received
        });

        conn.connect().await.expect("connect");
        assert!(conn.is_connected());
        assert!(conn.has_socket());
        conn.send_line("NICK test\r\nQUIT");

        assert!(matches!(events.recv().await, Some(ConnectionEvent::Connect)));
        let first = events.recv().await;
        let second = events.recv().await;
        assert!(matches!(first, Some(ConnectionEvent::Receive(ref l)) if l == ":server 001 nick :Welcome"));
        assert!(matches!(second, Some(ConnectionEvent::Receive(ref l)) if l == "PING :x"));

        let received = server.await.expect("server task");
        assert_eq!(received, "NICK testQUIT");
    }

    #[tokio::test]
    async fn test_manual_disconnect_reports_manual() {
        let (listener, target) = listener().await;
        let conn = DirectConnection::new(target, ConnectionOptions::new()).expect("valid");
        let ends = Arc::new(Mutex::new(Vec::new()));
        let ends_clone = Arc::clone(&ends);
        conn.events()
            .on_end(move |manual, error| ends_clone.lock().push((manual, error.is_some())));

        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        conn.connect().await.expect("connect");
        conn.disconnect().await.expect("disconnect");

        assert!(!conn.has_socket());
        assert!(!conn.is_connected());
        assert_eq!(*ends.lock(), vec![(true, false)]);

        // A closed transport is never reconnected in place.
        assert!(matches!(conn.connect().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_remote_close_reports_unexpected_disconnect() {
        let (listener, target) = listener().await;
        let conn = DirectConnection::new(target, ConnectionOptions::new()).expect("valid");
        let mut events = forward_events(&conn);

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            drop(socket);
        });

        conn.connect().await.expect("connect");
        assert!(matches!(events.recv().await, Some(ConnectionEvent::Connect)));
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Disconnect { manual: false, .. })
        ));
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::End { manual: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_fails_and_notifies() {
        let (listener, target) = listener().await;
        drop(listener);

        let conn = DirectConnection::new(target, ConnectionOptions::new()).expect("valid");
        let mut events = forward_events(&conn);

        let result = conn.connect().await;
        assert!(result.is_err());
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Disconnect { manual: false, error: Some(_) })
        ));
        assert!(!conn.is_connecting());
    }

    #[tokio::test]
    async fn test_send_line_dropped_when_not_connected() {
        let (_listener, target) = listener().await;
        let conn = DirectConnection::new(target, ConnectionOptions::new()).expect("valid");
        conn.send_line("PING :nobody");
        assert!(!conn.has_socket());
    }
}
