//! Connection destination descriptors.
//!
//! A [`ConnectionTarget`] names where to connect. Transports validate it on
//! construction and fail with [`Error::Config`] when a required part is
//! missing. A [`TargetSource`] lets the persistent engine resolve a fresh
//! target before every attempt.
//!
//! # Example
//!
//! ```ignore
//! use linesock::ConnectionTarget;
//!
//! let irc = ConnectionTarget::host("irc.libera.chat", 6697);
//! let ws = ConnectionTarget::url("wss://irc-ws.chat.twitch.tv:443");
//! let plain = ConnectionTarget::host("localhost", 6667).with_secure(false);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// ConnectionTarget
// ============================================================================

/// Destination of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTarget {
    /// Host name or IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Port. Transports may supply a default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Use TLS (`wss://` for WebSockets).
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// Pre-built URL, used by WebSocket transports only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_secure() -> bool {
    true
}

impl ConnectionTarget {
    /// Creates a secure target from host and port.
    #[must_use]
    pub fn host(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: Some(hostname.into()),
            port: Some(port),
            secure: true,
            url: None,
        }
    }

    /// Creates a target from a WebSocket URL.
    ///
    /// The secure flag follows the URL scheme.
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            hostname: None,
            port: None,
            secure: !url.starts_with("ws://"),
            url: Some(url),
        }
    }

    /// Sets whether TLS is used.
    #[inline]
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Returns the host name, failing if absent or empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no host name is set.
    pub fn require_hostname(&self) -> Result<&str> {
        match self.hostname.as_deref() {
            Some(host) if !host.is_empty() => Ok(host),
            _ => Err(Error::config("connection target has no host name")),
        }
    }

    /// Returns the remote host, taken from the URL when no host name is set.
    #[must_use]
    pub fn remote_host(&self) -> Option<String> {
        match (&self.hostname, &self.url) {
            (Some(host), _) => Some(host.clone()),
            (None, Some(url)) => Url::parse(url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string)),
            (None, None) => None,
        }
    }

    /// Returns the remote port, taken from the URL when no port is set.
    ///
    /// Transport defaults are not applied here.
    #[must_use]
    pub fn remote_port(&self) -> Option<u16> {
        match (self.port, &self.url) {
            (Some(port), _) => Some(port),
            (None, Some(url)) => Url::parse(url)
                .ok()
                .and_then(|url| url.port_or_known_default()),
            (None, None) => None,
        }
    }

    /// Resolves the WebSocket URL of this target.
    ///
    /// Uses [`url`](Self::url) when present, otherwise builds
    /// `ws[s]://host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid, uses another scheme,
    /// or neither a URL nor host and port are set.
    pub fn websocket_url(&self) -> Result<Url> {
        let url = match (&self.url, &self.hostname, self.port) {
            (Some(url), _, _) => Url::parse(url)
                .map_err(|e| Error::config(format!("invalid WebSocket URL {url:?}: {e}")))?,
            (None, Some(_), Some(port)) => {
                let host = self.require_hostname()?;
                let scheme = if self.secure { "wss" } else { "ws" };
                Url::parse(&format!("{scheme}://{host}:{port}"))
                    .map_err(|e| Error::config(format!("invalid WebSocket host {host:?}: {e}")))?
            }
            _ => {
                return Err(Error::config(
                    "WebSocket target needs either a URL or a host name and port",
                ));
            }
        };

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::config(format!(
                "unsupported WebSocket scheme {other:?}"
            ))),
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(url) = &self.url {
            return f.write_str(url);
        }
        let host = self.hostname.as_deref().unwrap_or("?");
        match self.port {
            Some(port) => write!(f, "{host}:{port}"),
            None => f.write_str(host),
        }
    }
}

// ============================================================================
// TargetSource
// ============================================================================

/// Resolver closure type.
pub type TargetResolver = Arc<dyn Fn() -> Result<ConnectionTarget> + Send + Sync>;

/// Where the persistent engine takes its target from.
#[derive(Clone)]
pub enum TargetSource {
    /// The same target for every attempt.
    Fixed(ConnectionTarget),
    /// Resolved again before every attempt.
    Dynamic(TargetResolver),
}

impl TargetSource {
    /// Creates a source that calls `resolver` before every attempt.
    pub fn dynamic<F>(resolver: F) -> Self
    where
        F: Fn() -> Result<ConnectionTarget> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(resolver))
    }

    /// Returns the target if it never changes.
    #[inline]
    #[must_use]
    pub fn fixed(&self) -> Option<&ConnectionTarget> {
        match self {
            Self::Fixed(target) => Some(target),
            Self::Dynamic(_) => None,
        }
    }

    /// Returns the target for the next attempt.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's error.
    pub fn resolve(&self) -> Result<ConnectionTarget> {
        match self {
            Self::Fixed(target) => Ok(target.clone()),
            Self::Dynamic(resolver) => resolver(),
        }
    }
}

impl From<ConnectionTarget> for TargetSource {
    fn from(target: ConnectionTarget) -> Self {
        Self::Fixed(target)
    }
}

impl fmt::Debug for TargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(target) => f.debug_tuple("Fixed").field(target).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU16, Ordering};

    #[test]
    fn test_websocket_url_from_host() {
        let target = ConnectionTarget::host("irc.example.org", 8080).with_secure(false);
        assert_eq!(
            target.websocket_url().expect("valid").as_str(),
            "ws://irc.example.org:8080/"
        );
    }

    #[test]
    fn test_websocket_url_prefers_explicit_url() {
        let target = ConnectionTarget::url("wss://irc-ws.chat.twitch.tv:443");
        assert!(target.secure);
        assert_eq!(target.websocket_url().expect("valid").scheme(), "wss");
    }

    #[test]
    fn test_websocket_url_rejects_missing_parts() {
        let target = ConnectionTarget {
            hostname: Some("example.org".into()),
            port: None,
            secure: true,
            url: None,
        };
        assert!(target.websocket_url().unwrap_err().is_config_error());
    }

    #[test]
    fn test_websocket_url_rejects_other_scheme() {
        let target = ConnectionTarget::url("http://example.org");
        assert!(target.websocket_url().unwrap_err().is_config_error());
    }

    #[test]
    fn test_require_hostname() {
        let empty = ConnectionTarget::host("", 6667);
        assert!(empty.require_hostname().is_err());
        assert_eq!(
            ConnectionTarget::host("a", 1).require_hostname().expect("set"),
            "a"
        );
    }

    #[test]
    fn test_deserialize_defaults_to_secure() {
        let target: ConnectionTarget =
            serde_json::from_str(r#"{"hostname":"irc.libera.chat"}"#).expect("valid json");
        assert!(target.secure);
        assert_eq!(target.port, None);
        assert_eq!(target.to_string(), "irc.libera.chat");
    }

    #[test]
    fn test_remote_endpoint_falls_back_to_url() {
        let host = ConnectionTarget::host("irc.example.org", 6697);
        assert_eq!(host.remote_host().as_deref(), Some("irc.example.org"));
        assert_eq!(host.remote_port(), Some(6697));

        let ws = ConnectionTarget::url("wss://irc-ws.chat.twitch.tv");
        assert_eq!(ws.remote_host().as_deref(), Some("irc-ws.chat.twitch.tv"));
        assert_eq!(ws.remote_port(), Some(443));

        let bare: ConnectionTarget =
            serde_json::from_str(r#"{"hostname":"irc.libera.chat"}"#).expect("valid json");
        assert_eq!(bare.remote_port(), None);
    }

    #[test]
    fn test_dynamic_source_resolves_each_time() {
        let port = Arc::new(AtomicU16::new(1000));
        let port_clone = Arc::clone(&port);
        let source = TargetSource::dynamic(move || {
            let p = port_clone.fetch_add(1, Ordering::SeqCst);
            Ok(ConnectionTarget::host("localhost", p))
        });

        assert!(source.fixed().is_none());
        assert_eq!(source.resolve().expect("ok").port, Some(1000));
        assert_eq!(source.resolve().expect("ok").port, Some(1001));
    }
}
