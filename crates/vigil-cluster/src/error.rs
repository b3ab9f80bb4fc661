//! Error types for the cluster agent.

use thiserror::Error;

use vigil_state::StateError;

/// Result type alias for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors the agent distinguishes.
///
/// Inside the tick loop nothing is fatal: transport failures become
/// `unknown` node placeholders, storage and membership failures are logged
/// and retried on the next tick. Only `Config` aborts startup.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// A peer could not be reached or timed out.
    #[error("peer unavailable: {0}")]
    Unavailable(String),

    /// The membership driver failed; the previous member snapshot is reused.
    #[error("membership error: {0}")]
    Membership(String),

    /// The status store failed; the cache stays authoritative for the tick.
    #[error("storage error: {0}")]
    Storage(#[from] StateError),

    /// Invalid configuration, fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Unexpected failure contained at a tick boundary.
    #[error("internal error: {0}")]
    Internal(String),
}
