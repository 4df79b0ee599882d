//! Error types for the client.
//!
//! These errors stay inside the crate's services: the engine logs them and
//! reports an outcome instead, so the UI layer never has to handle them.

use cart_sync_core::wire::WireError;
use thiserror::Error;

/// Errors that can occur talking to the cart endpoint.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body was not valid JSON for the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Response parsed but violates the endpoint contract.
    #[error("Malformed response: {0}")]
    Malformed(#[from] WireError),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl SyncError {
    /// Whether retrying the same request later could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Parse(_) | Self::Malformed(_) | Self::Url(_) => false,
        }
    }
}

/// Errors reading or writing the local cart snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}
