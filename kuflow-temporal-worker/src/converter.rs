//! Payload converter that tags values marked for encryption.

use crate::error::WorkerResult;
use crate::instrumentation::Value;
use crate::payload::{
    JsonPayloadConverter, METADATA_ENCODING_ENCRYPTED_KEY_ID, Payload, PayloadConverter,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Wraps a delegate converter and stamps wrapped values with their key id.
///
/// The stamped `encoding-encrypted-key-id` metadata is what tells
/// [`EncryptionPayloadCodec`](crate::EncryptionPayloadCodec) to seal the
/// payload later on. Decoding is delegated untouched.
#[derive(Debug, Clone)]
pub struct EncryptionPayloadConverter {
    delegate: Arc<dyn PayloadConverter>,
}

impl EncryptionPayloadConverter {
    pub fn new(delegate: Arc<dyn PayloadConverter>) -> Self {
        Self { delegate }
    }

    /// A converter delegating to [`JsonPayloadConverter`].
    pub fn json() -> Self {
        Self::new(Arc::new(JsonPayloadConverter))
    }

    /// Encoding tag of the delegate.
    pub fn encoding(&self) -> &str {
        self.delegate.encoding()
    }

    pub fn to_payload(&self, value: &Value) -> WorkerResult<Payload> {
        let payload = self.delegate.to_payload(value.inner())?;

        match value.state().and_then(|state| state.key_id()) {
            Some(key_id) => Ok(payload.with_metadata(METADATA_ENCODING_ENCRYPTED_KEY_ID, key_id)),
            None => Ok(payload),
        }
    }

    pub fn to_payloads(&self, values: &[Value]) -> WorkerResult<Vec<Payload>> {
        values.iter().map(|value| self.to_payload(value)).collect()
    }

    pub fn from_payload(&self, payload: &Payload) -> WorkerResult<serde_json::Value> {
        self.delegate.from_payload(payload)
    }

    pub fn from_payload_as<T: DeserializeOwned>(&self, payload: &Payload) -> WorkerResult<T> {
        Ok(serde_json::from_value(self.from_payload(payload)?)?)
    }
}

impl Default for EncryptionPayloadConverter {
    fn default() -> Self {
        Self::json()
    }
}
