//! Encryption state carried through a call chain.
//!
//! A call chain is encrypted when its headers carry [`HEADER_ENCODING_KEY`]
//! set to [`ENCODING_ENCRYPTED`] together with a key id. Interceptors read
//! that state from inbound headers, stamp it onto outbound headers, and wrap
//! the values that must be sealed so the payload converter can tag them.

use crate::error::WorkerResult;
use crate::payload::{
    ENCODING_ENCRYPTED, HEADER_ENCODING_ENCRYPTED_KEY_ID, HEADER_ENCODING_KEY, Headers,
    JsonPayloadConverter, Payload, PayloadConverter,
};
use tracing::debug;

/// Whether a call chain is encrypted, and under which key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EncryptionState {
    key_id: Option<String>,
}

impl EncryptionState {
    /// The "no encryption" state.
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn active(key_id: impl Into<String>) -> Self {
        Self {
            key_id: Some(key_id.into()),
        }
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.key_id.is_some()
    }

    /// Adopts `other` wholesale.
    ///
    /// This is a replacement, not a union: merging an unset state clears an
    /// active one.
    pub fn merge(&mut self, other: &EncryptionState) {
        self.key_id = other.key_id.clone();
    }
}

/// A value paired with the encryption state it must be sealed under.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionWrapper {
    pub state: EncryptionState,
    pub value: serde_json::Value,
}

/// A workflow or activity argument or result as seen by interceptors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Plain(serde_json::Value),
    Wrapped(EncryptionWrapper),
}

impl Value {
    /// The underlying JSON value.
    pub fn inner(&self) -> &serde_json::Value {
        match self {
            Value::Plain(value) => value,
            Value::Wrapped(wrapper) => &wrapper.value,
        }
    }

    pub fn into_inner(self) -> serde_json::Value {
        match self {
            Value::Plain(value) => value,
            Value::Wrapped(wrapper) => wrapper.value,
        }
    }

    /// The encryption state attached to this value, if wrapped.
    pub fn state(&self) -> Option<&EncryptionState> {
        match self {
            Value::Plain(_) => None,
            Value::Wrapped(wrapper) => Some(&wrapper.state),
        }
    }

    /// Wraps the value under `state` when it is active; otherwise returns it unchanged.
    pub fn wrap(self, state: &EncryptionState) -> Value {
        if !state.is_active() {
            return self;
        }
        Value::Wrapped(EncryptionWrapper {
            state: state.clone(),
            value: self.into_inner(),
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Plain(value)
    }
}

/// Reads the encryption state from call headers.
///
/// The key id header is only consulted when the encoding header decodes to
/// the encrypted sentinel.
pub fn retrieve_encryption_state(headers: &Headers) -> EncryptionState {
    let converter = JsonPayloadConverter;

    let encrypted = headers
        .get(HEADER_ENCODING_KEY)
        .and_then(|payload| decode_header(&converter, HEADER_ENCODING_KEY, payload))
        .is_some_and(|encoding| encoding == ENCODING_ENCRYPTED);
    if !encrypted {
        return EncryptionState::unset();
    }

    match headers
        .get(HEADER_ENCODING_ENCRYPTED_KEY_ID)
        .and_then(|payload| decode_header(&converter, HEADER_ENCODING_ENCRYPTED_KEY_ID, payload))
    {
        Some(key_id) => EncryptionState::active(key_id),
        None => {
            debug!("encrypted call chain without a key id header");
            EncryptionState::unset()
        }
    }
}

/// Returns `headers` with the encryption headers set when `state` is active.
///
/// A header that fails to encode fails the call, so an encrypted chain never
/// goes out without its headers.
pub fn add_encryption_encoding(
    state: &EncryptionState,
    mut headers: Headers,
) -> WorkerResult<Headers> {
    let Some(key_id) = state.key_id() else {
        return Ok(headers);
    };

    let converter = JsonPayloadConverter;
    for (name, value) in [
        (HEADER_ENCODING_KEY, ENCODING_ENCRYPTED),
        (HEADER_ENCODING_ENCRYPTED_KEY_ID, key_id),
    ] {
        let payload = converter.to_payload(&serde_json::Value::from(value))?;
        headers.insert(name.to_string(), payload);
    }
    Ok(headers)
}

/// Wraps every value under `state` when it is active.
pub fn mark_objects_to_be_encrypted(state: &EncryptionState, values: Vec<Value>) -> Vec<Value> {
    if !state.is_active() {
        return values;
    }
    values.into_iter().map(|value| value.wrap(state)).collect()
}

fn decode_header(
    converter: &JsonPayloadConverter,
    name: &str,
    payload: &Payload,
) -> Option<String> {
    match converter.from_payload(payload) {
        Ok(serde_json::Value::String(value)) if !value.is_empty() => Some(value),
        Ok(_) => None,
        Err(e) => {
            debug!(header = name, error = %e, "ignoring undecodable header");
            None
        }
    }
}
