//! Transport construction for the persistent engine.

// ============================================================================
// Imports
// ============================================================================

use crate::connection::{Connection, ConnectionOptions, ConnectionTarget};
use crate::error::Result;

// ============================================================================
// ConnectionFactory
// ============================================================================

/// Builds a fresh transport for every connect attempt.
///
/// Implemented for any `Fn(ConnectionTarget, ConnectionOptions) -> Result<C>`,
/// so transport constructors can be passed directly:
///
/// ```ignore
/// use linesock::{DirectConnection, PersistentConnection};
///
/// let conn = PersistentConnection::builder(DirectConnection::new)
///     .target(ConnectionTarget::host("irc.libera.chat", 6697))
///     .build()?;
/// ```
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Transport type produced by this factory.
    type Connection: Connection;

    /// Creates an unconnected transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the target is
    /// malformed.
    fn create(
        &self,
        target: ConnectionTarget,
        options: ConnectionOptions,
    ) -> Result<Self::Connection>;
}

impl<C, F> ConnectionFactory for F
where
    C: Connection,
    F: Fn(ConnectionTarget, ConnectionOptions) -> Result<C> + Send + Sync + 'static,
{
    type Connection = C;

    fn create(&self, target: ConnectionTarget, options: ConnectionOptions) -> Result<C> {
        self(target, options)
    }
}
