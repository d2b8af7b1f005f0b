//! Builder pattern for persistent connections.
//!
//! # Example
//!
//! ```no_run
//! use linesock::{ConnectionTarget, DirectConnection, PersistentConnection};
//!
//! # fn example() -> linesock::Result<()> {
//! let conn = PersistentConnection::builder(DirectConnection::new)
//!     .target(ConnectionTarget::host("irc.libera.chat", 6697))
//!     .initial_retry_limit(Some(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::connection::{ConnectionOptions, ConnectionTarget, TargetSource};
use crate::error::{Error, Result};

use super::config::PersistentConnectionConfig;
use super::core::PersistentConnection;
use super::factory::ConnectionFactory;

// ============================================================================
// PersistentConnectionBuilder
// ============================================================================

/// Builder for configuring a [`PersistentConnection`].
///
/// Use [`PersistentConnection::builder()`] to create one.
pub struct PersistentConnectionBuilder<F> {
    /// Transport constructor.
    factory: F,
    /// Where each attempt connects to.
    target: Option<TargetSource>,
    /// Options handed to every transport.
    options: ConnectionOptions,
    /// Retry policy.
    config: PersistentConnectionConfig,
}

impl<F> fmt::Debug for PersistentConnectionBuilder<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentConnectionBuilder")
            .field("target", &self.target)
            .field("options", &self.options)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PersistentConnectionBuilder Implementation
// ============================================================================

impl<F: ConnectionFactory> PersistentConnectionBuilder<F> {
    /// Creates a builder around a transport factory.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            target: None,
            options: ConnectionOptions::default(),
            config: PersistentConnectionConfig::default(),
        }
    }

    /// Connects every attempt to a fixed target.
    #[inline]
    #[must_use]
    pub fn target(mut self, target: ConnectionTarget) -> Self {
        self.target = Some(TargetSource::Fixed(target));
        self
    }

    /// Resolves the target anew before every attempt.
    ///
    /// Useful for rotating between servers of a network.
    #[inline]
    #[must_use]
    pub fn resolver<R>(mut self, resolver: R) -> Self
    where
        R: Fn() -> Result<ConnectionTarget> + Send + Sync + 'static,
    {
        self.target = Some(TargetSource::dynamic(resolver));
        self
    }

    /// Sets the options handed to every transport.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the whole retry policy.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: PersistentConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the retry budget for automatic reconnects. `None` is unbounded.
    #[inline]
    #[must_use]
    pub fn retry_limit(mut self, limit: Option<u32>) -> Self {
        self.config.retry_limit = limit;
        self
    }

    /// Sets the retry budget for user-initiated connects. `None` is unbounded.
    #[inline]
    #[must_use]
    pub fn initial_retry_limit(mut self, limit: Option<u32>) -> Self {
        self.config.initial_retry_limit = limit;
        self
    }

    /// Keeps the old session alive during `reconnect()` until acknowledged.
    #[inline]
    #[must_use]
    pub fn overlap_manual_reconnect(mut self, enabled: bool) -> Self {
        self.config.overlap_manual_reconnect = enabled;
        self
    }

    /// Builds the connection with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no target or resolver was set
    /// - [`Error::Config`] if a fixed target has no destination
    pub fn build(self) -> Result<PersistentConnection<F>> {
        let target = self.validate_target()?;
        Ok(PersistentConnection::new(
            self.factory,
            target,
            self.options,
            self.config,
        ))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl<F> PersistentConnectionBuilder<F> {
    /// Validates the target configuration.
    fn validate_target(&self) -> Result<TargetSource> {
        let target = self.target.clone().ok_or_else(|| {
            Error::config(
                "Target is required. Use .target() or .resolver() to set it.\n\
                 Example: PersistentConnection::builder(DirectConnection::new)\
                 .target(ConnectionTarget::host(\"irc.libera.chat\", 6697))",
            )
        })?;

        if let TargetSource::Fixed(fixed) = &target
            && fixed.url.is_none()
            && fixed.hostname.is_none()
        {
            return Err(Error::config(
                "Target needs a hostname or a URL.\n\
                 Example: ConnectionTarget::host(\"irc.libera.chat\", 6697)",
            ));
        }

        Ok(target)
    }
}

// ============================================================================
// Tests
// ============================================================================
