//! Wire payloads, call headers, and the plain JSON converter.

use crate::error::{WorkerError, WorkerResult};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// Call header marking a call chain as encrypted.
pub const HEADER_ENCODING_KEY: &str = "x-kuflow-encoding";

/// Call header naming the key used for an encrypted call chain.
pub const HEADER_ENCODING_ENCRYPTED_KEY_ID: &str = "x-kuflow-encoding-encrypted-key-id";

/// Payload metadata entry naming the payload's wire encoding.
pub const METADATA_ENCODING_KEY: &str = "encoding";

/// Payload metadata entry naming the key a payload is (or must be) encrypted with.
pub const METADATA_ENCODING_ENCRYPTED_KEY_ID: &str = "encoding-encrypted-key-id";

/// Sentinel shared by the encryption header and the encrypted payload encoding.
pub const ENCODING_ENCRYPTED: &str = "binary/encrypted?vendor=KuFlow";

/// Encoding written by [`JsonPayloadConverter`].
pub const ENCODING_JSON_PLAIN: &str = "json/plain";

/// A unit of wire data exchanged across workflow and activity boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub metadata: BTreeMap<String, Vec<u8>>,
    pub data: Vec<u8>,
}

impl Payload {
    pub fn new(metadata: BTreeMap<String, Vec<u8>>, data: Vec<u8>) -> Self {
        Self { metadata, data }
    }

    /// Returns a metadata entry decoded as UTF-8, if present and valid.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the `encoding` metadata entry.
    pub fn encoding(&self) -> Option<&str> {
        self.metadata_str(METADATA_ENCODING_KEY)
    }

    /// True if the payload carries the encrypted envelope encoding.
    pub fn is_encrypted(&self) -> bool {
        self.encoding() == Some(ENCODING_ENCRYPTED)
    }
}

/// Per-call header map. Flows from parent call to child call.
pub type Headers = BTreeMap<String, Payload>;

/// Converts plain values to and from payloads.
pub trait PayloadConverter: Send + Sync + std::fmt::Debug {
    /// Encoding tag written to the payload's `encoding` metadata.
    fn encoding(&self) -> &str;

    fn to_payload(&self, value: &serde_json::Value) -> WorkerResult<Payload>;

    fn from_payload(&self, payload: &Payload) -> WorkerResult<serde_json::Value>;
}

/// The default converter: UTF-8 JSON with `encoding = "json/plain"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadConverter;

impl JsonPayloadConverter {
    /// Decodes a payload straight into a typed value.
    pub fn from_payload_as<T: DeserializeOwned>(&self, payload: &Payload) -> WorkerResult<T> {
        Ok(serde_json::from_value(self.from_payload(payload)?)?)
    }
}

impl PayloadConverter for JsonPayloadConverter {
    fn encoding(&self) -> &str {
        ENCODING_JSON_PLAIN
    }

    fn to_payload(&self, value: &serde_json::Value) -> WorkerResult<Payload> {
        let data = serde_json::to_vec(value)?;
        Ok(Payload::new(BTreeMap::new(), data)
            .with_metadata(METADATA_ENCODING_KEY, ENCODING_JSON_PLAIN))
    }

    fn from_payload(&self, payload: &Payload) -> WorkerResult<serde_json::Value> {
        match payload.encoding() {
            Some(ENCODING_JSON_PLAIN) => Ok(serde_json::from_slice(&payload.data)?),
            Some(other) => Err(WorkerError::MalformedPayload(format!(
                "expected {ENCODING_JSON_PLAIN} encoding, found {other}"
            ))),
            None => Err(WorkerError::MalformedPayload(
                "payload has no encoding".to_string(),
            )),
        }
    }
}
