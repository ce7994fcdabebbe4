//! Error types for the worker payload pipeline.

use kuflow_crypto::CryptoError;
use kuflow_kms::KmsError;
use thiserror::Error;

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised while converting, encrypting, or intercepting payloads.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The key could not be fetched from the key store.
    #[error("key resolution failed: {0}")]
    KeyResolution(#[from] KmsError),

    /// Cipher failure. A `Decryption` source means the payload failed authentication.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// An encrypted payload is missing required parts.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// An encrypted payload names an algorithm this worker does not use.
    #[error("unsupported encryption algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid base64 payload data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failure reported by the host runtime or by user workflow/activity code.
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("worker connection is closed")]
    Closed,
}

impl WorkerError {
    /// Returns true if the error means an encrypted payload cannot be trusted:
    /// it failed authentication or its envelope is malformed.
    pub fn is_integrity_failure(&self) -> bool {
        match self {
            WorkerError::Crypto(e) => e.is_integrity_failure(),
            WorkerError::MalformedPayload(_)
            | WorkerError::UnsupportedAlgorithm(_)
            | WorkerError::Base64(_) => true,
            _ => false,
        }
    }
}
