//! KMS client error types.

use thiserror::Error;

/// Result type for key retrieval.
pub type KmsResult<T> = Result<T, KmsError>;

/// Errors that can occur while resolving an encryption key.
#[derive(Debug, Error)]
pub enum KmsError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("access denied to key {key_id}: HTTP {status}")]
    AccessDenied { key_id: String, status: u16 },

    #[error("KMS request failed: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid key material for {key_id}: {reason}")]
    InvalidKey { key_id: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl KmsError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            KmsError::Http(e) => e.is_timeout() || e.is_connect(),
            KmsError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
