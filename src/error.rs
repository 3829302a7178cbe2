//! Error kinds shared across component boundaries.
//!
//! Compute paths degrade to documented defaults on persistence read
//! failures; these typed kinds surface only where the caller has to react
//! (gateway failures, malformed input, cancellation).

use thiserror::Error;

/// Typed failure kinds for component APIs.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Malformed input, empty identifiers.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown wallet or token.
    #[error("not found: {0}")]
    NotFound(String),

    /// Retryable failure: gateway 5xx, broker unavailable, DB deadlock.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Non-retryable failure: schema mismatch, corrupt persisted record.
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// Context cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// Upstream throttle. Callers should back off at least `retry_after`.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

impl OracleError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::Transient(_) | OracleError::RateLimited { .. }
        )
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        OracleError::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        OracleError::NotFound(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        OracleError::Transient(msg.into())
    }
}
