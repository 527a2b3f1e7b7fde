//! Relay error taxonomy.
//!
//! Only `Bind` is fatal to the process. Everything else is contained in the
//! handler of the connection it happened on.

use relay_core::StoreError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Malformed remote address: {0}")]
    MalformedAddress(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Failed to encode peer list: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RelayError {
    /// Whether this is an ordinary end-of-connection condition rather than
    /// a failure worth surfacing above debug level.
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Transport(_) | RelayError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
