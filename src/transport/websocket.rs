//! WebSocket transport.
//!
//! Each outgoing line travels in one text message. Incoming text and binary
//! messages are fed to the line framer, so a server may batch several lines
//! into one message or split one line over several.
//!
//! # Example
//!
//! ```ignore
//! use linesock::{Connection, ConnectionOptions, ConnectionTarget, WebSocketConnection};
//!
//! let conn = WebSocketConnection::new(
//!     ConnectionTarget::url("wss://irc-ws.chat.twitch.tv:443"),
//!     ConnectionOptions::new(),
//! )?;
//! conn.connect().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::connection::{ConnectionCore, ConnectionOptions, ConnectionTarget, Transport};
use crate::error::{Error, Result};

use super::{CommandSlot, TransportCommand};

// ============================================================================
// Types
// ============================================================================

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketConnection
// ============================================================================

/// Line-protocol connection over a WebSocket.
pub struct WebSocketConnection {
    /// Shared state machine.
    core: ConnectionCore,
    /// Resolved endpoint.
    url: Url,
    /// Transport options.
    options: ConnectionOptions,
    /// Command channel of the running event loop.
    commands: CommandSlot,
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection")
            .field("url", &self.url.as_str())
            .field("state", &self.core.state())
            .finish_non_exhaustive()
    }
}

impl WebSocketConnection {
    /// Creates an unconnected transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the target has neither a valid
    /// `ws://`/`wss://` URL nor a host name and port.
    pub fn new(target: ConnectionTarget, options: ConnectionOptions) -> Result<Self> {
        let url = target.websocket_url()?;

        Ok(Self {
            core: ConnectionCore::new(options.line_based),
            url,
            options,
            commands: CommandSlot::default(),
        })
    }

    /// Returns the WebSocket URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the remote host name.
    #[inline]
    #[must_use]
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Returns the remote port, including scheme defaults.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or_default()
    }

    /// Returns `true` for `wss://` endpoints.
    #[inline]
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    /// Runs the WebSocket handshake.
    async fn dial(&self) -> Result<ClientStream> {
        let connector = if self.is_secure() && self.options.accept_invalid_certs {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (ws_stream, response) = tokio_tungstenite::connect_async_tls_with_config(
            self.url.as_str(),
            self.options.websocket_config.clone(),
            true,
            connector,
        )
        .await?;

        trace!(status = %response.status(), "WebSocket handshake completed");
        Ok(ws_stream)
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        ws_stream: ClientStream,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        core: ConnectionCore,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut shutdown_ack = None;

        let error = loop {
            tokio::select! {
                // Incoming messages from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            core.receive_raw(text.as_str().as_bytes());
                        }

                        Some(Ok(Message::Binary(data))) => {
                            core.receive_raw(&data);
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break close_error(frame);
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break Some(Error::WebSocket(e));
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break None;
                        }

                        // Ignore Ping, Pong, Frame
                        _ => {}
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(data)) => {
                            if let Err(e) = ws_write.send(Message::Text(data.into())).await {
                                warn!(error = %e, "Failed to send WebSocket message");
                                break Some(Error::WebSocket(e));
                            }
                            trace!("Message sent");
                        }

                        Some(TransportCommand::Shutdown(ack)) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            shutdown_ack = Some(ack);
                            break None;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
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

/// Maps a close frame to the disconnect error, `None` for a normal close.
fn close_error(frame: Option<CloseFrame>) -> Option<Error> {
    match frame {
        Some(frame) if frame.code != CloseCode::Normal => Some(Error::connection(format!(
            "[{}] {}",
            u16::from(frame.code),
            frame.reason.as_str()
        ))),
        _ => None,
    }
}

#[async_trait]
impl Transport for WebSocketConnection {
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
        debug!(url = %self.url, "Opening WebSocket");

        let ws_stream = match self
            .core
            .dial(self.options.connect_timeout, self.dial())
            .await
        {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                debug!(error = %e, "WebSocket connect failed");
                self.core.finish(Some(e.replicate()));
                return Err(e);
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        self.commands.install(command_tx);
        if !self.core.mark_connected() {
            drop(self.commands.take());
            self.core.finish(None);
            return Err(Error::ConnectionClosed);
        }

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            self.core.clone(),
        ));

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(url = %self.url, "Closing WebSocket");
        self.core.request_manual();
        self.commands.shutdown().await;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
