//! Error types for gradcheck-state

use thiserror::Error;

/// Errors surfaced by criteria, reference-data and audit stores.
///
/// A key with nothing saved is not an error: `fetch` returns empty data.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store could not be reached (DNS, connect, timeout, TLS)
    #[error("criteria store unreachable: {0}")]
    Transport(String),

    /// The caller is not authenticated or not allowed
    #[error("not authorized (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The store answered with a non-success status
    #[error("criteria store returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Request body could not be encoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Invalid client configuration (bad base URL, TLS setup)
    #[error("invalid client configuration: {0}")]
    Config(String),

    /// Failure injected by an in-memory fake
    #[error("injected failure: {0}")]
    Injected(String),
}

impl StorageError {
    /// True for failures reaching or authenticating with the store, as
    /// opposed to the store rejecting a request.
    pub fn is_transport_or_auth(&self) -> bool {
        matches!(
            self,
            StorageError::Transport(_) | StorageError::Unauthorized { .. }
        )
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => StorageError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => StorageError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
