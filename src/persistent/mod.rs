//! Auto-reconnecting engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐  creates per attempt  ┌──────────────────────┐
//! │ PersistentConnection │ ────────────────────► │ ConnectionFactory    │
//! │  retry cycles        │                       │  -> Connection       │
//! │  Fibonacci backoff   │ ◄──── notifications ─ │  (Direct, WebSocket) │
//! └──────────────────────┘                       └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent construction |
//! | `config` | Retry policy |
//! | `core` | The engine |
//! | `factory` | Transport construction |
//! | `retry` | Cycle bookkeeping (internal) |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent construction.
pub mod builder;

/// Retry policy.
pub mod config;

/// The engine.
pub mod core;

/// Transport construction.
pub mod factory;

mod retry;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::PersistentConnection;
pub use builder::PersistentConnectionBuilder;
pub use config::{DEFAULT_INITIAL_RETRY_LIMIT, PersistentConnectionConfig};
pub use factory::ConnectionFactory;
