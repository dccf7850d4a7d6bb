//! Error types for the sockpool crate.

use thiserror::Error;

/// Unified error type for pool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint is not present in the registry.
    #[error("proxy not found")]
    NotFound,

    /// The operation observed the pool's cancellation signal.
    #[error("operation cancelled")]
    Cancelled,

    /// The worker pool cannot accept more work right now. Transient;
    /// recycling will resubmit the endpoint later.
    #[error("worker pool saturated")]
    PoolSaturated,

    /// A validation probe failed. Absorbed into per-endpoint bad state,
    /// never surfaced outside the worker pool.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A dial through a proxy failed. Surfaced to dialer callers unchanged.
    #[error("dial failed: {0}")]
    Dial(String),

    /// Construction-time misconfiguration. Fatal, reported immediately.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
