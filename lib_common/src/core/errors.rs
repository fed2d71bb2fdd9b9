//! Error taxonomy for the reconciliation core.
//!
//! The split matters operationally: transient fetch failures abort a
//! single target's cycle without touching the store, permanent ones are
//! routed to the admin tracker, sink failures leave the triggering
//! transition uncommitted, and persistence failures abort the rest of
//! the cycle with the on-disk state preserved.

use std::time::Duration;

use thiserror::Error;

/// A failed snapshot or existence-check fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    /// The configured target does not exist upstream. Routed to the
    /// admin tracker, never retried within the cycle.
    #[error("target not recognized upstream: {0}")]
    InvalidTarget(String),
}

impl FetchError {
    /// Transient errors are worth retrying with backoff; an invalid
    /// target is not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::InvalidTarget(_))
    }
}

/// A failed notification send.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink transport error: {0}")]
    Transport(String),

    #[error("sink rejected message: {0}")]
    Rejected(String),

    #[error("sink send timed out")]
    Timeout,

    #[error("no channel configured for routing label {0:?}")]
    NoChannel(Option<String>),
}

/// A failed state-shard read or write.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("failed to replace state file atomically: {0}")]
    Replace(String),
}
