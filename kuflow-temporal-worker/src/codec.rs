//! Envelope encryption of wire payloads.
//!
//! A payload stamped with `encoding-encrypted-key-id` is sealed whole: its
//! metadata and data are serialized, encrypted under the named key, and
//! replaced by an envelope:
//!
//! ```text
//! metadata: encoding = binary/encrypted?vendor=KuFlow
//!           encoding-encrypted-key-id = <key id>
//! data:     <algorithm>:<base64 ciphertext>
//! ```
//!
//! Keys are resolved through a [`KeyCache`] in front of the [`KeyStore`], so
//! a burst of payloads for the same key costs one remote fetch.

use crate::cache::KeyCache;
use crate::config::EncryptionConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::payload::{
    ENCODING_ENCRYPTED, METADATA_ENCODING_ENCRYPTED_KEY_ID, METADATA_ENCODING_KEY, Payload,
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use futures::future::try_join_all;
use kuflow_crypto::{Cipher, EncryptionKey};
use kuflow_kms::KeyStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Transforms payload batches on their way to and from the wire.
///
/// Output order always matches input order.
#[async_trait]
pub trait PayloadCodec: Send + Sync {
    async fn encode(&self, payloads: Vec<Payload>) -> WorkerResult<Vec<Payload>>;

    async fn decode(&self, payloads: Vec<Payload>) -> WorkerResult<Vec<Payload>>;
}

/// Codec sealing marked payloads with keys fetched from a [`KeyStore`].
pub struct EncryptionPayloadCodec {
    cache: KeyCache<EncryptionKey>,
    key_store: Arc<dyn KeyStore>,
    cipher: Arc<dyn Cipher>,
}

impl EncryptionPayloadCodec {
    pub fn new(
        cache: KeyCache<EncryptionKey>,
        key_store: Arc<dyn KeyStore>,
        cipher: Arc<dyn Cipher>,
    ) -> Self {
        Self {
            cache,
            key_store,
            cipher,
        }
    }

    /// Builds the codec and its key cache from `config`.
    ///
    /// Must be called inside a Tokio runtime, since the cache starts its
    /// cleanup task immediately.
    pub fn from_config(config: &EncryptionConfig, key_store: Arc<dyn KeyStore>) -> Self {
        let cache = KeyCache::new(config.key_ttl(), config.cleanup_interval());
        Self::new(cache, key_store, config.algorithm.cipher())
    }

    pub fn cipher(&self) -> &Arc<dyn Cipher> {
        &self.cipher
    }

    pub fn cache(&self) -> &KeyCache<EncryptionKey> {
        &self.cache
    }

    /// Stops the key cache's cleanup task.
    pub async fn close(&self) {
        self.cache.close().await;
    }

    async fn resolve_key(&self, key_id: &str) -> WorkerResult<EncryptionKey> {
        self.cache
            .get(key_id, move || async move {
                let bytes = self.key_store.retrieve_key(key_id).await?;
                Ok::<_, WorkerError>(EncryptionKey::from_slice(&bytes)?)
            })
            .await
    }

    async fn encrypt_one(&self, payload: Payload) -> WorkerResult<Payload> {
        if payload.is_encrypted() {
            debug!("payload already sealed, passing through");
            return Ok(payload);
        }
        let Some(key_id) = metadata_text(&payload, METADATA_ENCODING_ENCRYPTED_KEY_ID)? else {
            return Ok(payload);
        };
        let key_id = key_id.to_string();

        let key = self.resolve_key(&key_id).await?;
        let plaintext = serde_json::to_vec(&SealedPayload::from(&payload))?;
        let ciphertext = self.cipher.encrypt(key.as_bytes(), &plaintext)?;
        let data = format!("{}:{}", self.cipher.algorithm(), STANDARD.encode(ciphertext));

        Ok(Payload::new(BTreeMap::new(), data.into_bytes())
            .with_metadata(METADATA_ENCODING_KEY, ENCODING_ENCRYPTED)
            .with_metadata(METADATA_ENCODING_ENCRYPTED_KEY_ID, key_id))
    }

    async fn decrypt_one(&self, payload: Payload) -> WorkerResult<Payload> {
        if !payload.is_encrypted() {
            return Ok(payload);
        }

        let key_id = metadata_text(&payload, METADATA_ENCODING_ENCRYPTED_KEY_ID)?
            .ok_or_else(|| {
                WorkerError::MalformedPayload("encrypted payload has no key id".to_string())
            })?;
        if payload.data.is_empty() {
            return Err(WorkerError::MalformedPayload(
                "encrypted payload has no data".to_string(),
            ));
        }

        let data = std::str::from_utf8(&payload.data).map_err(|_| {
            WorkerError::MalformedPayload("encrypted payload data is not ASCII".to_string())
        })?;
        let (algorithm, encoded) = data.split_once(':').ok_or_else(|| {
            WorkerError::MalformedPayload("encrypted payload data has no algorithm tag".to_string())
        })?;
        if algorithm != self.cipher.algorithm() {
            return Err(WorkerError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        let ciphertext = STANDARD.decode(encoded)?;

        let key = self.resolve_key(key_id).await?;
        let plaintext = self.cipher.decrypt(key.as_bytes(), &ciphertext)?;
        let sealed: SealedPayload = serde_json::from_slice(&plaintext)?;
        sealed.into_payload()
    }
}

impl std::fmt::Debug for EncryptionPayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionPayloadCodec")
            .field("algorithm", &self.cipher.algorithm())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PayloadCodec for EncryptionPayloadCodec {
    async fn encode(&self, payloads: Vec<Payload>) -> WorkerResult<Vec<Payload>> {
        try_join_all(payloads.into_iter().map(|p| self.encrypt_one(p))).await
    }

    async fn decode(&self, payloads: Vec<Payload>) -> WorkerResult<Vec<Payload>> {
        try_join_all(payloads.into_iter().map(|p| self.decrypt_one(p))).await
    }
}

/// Returns a metadata entry as text. A present but non-UTF-8 entry is malformed.
fn metadata_text<'a>(payload: &'a Payload, key: &str) -> WorkerResult<Option<&'a str>> {
    payload
        .metadata
        .get(key)
        .map(|bytes| {
            std::str::from_utf8(bytes)
                .map_err(|_| WorkerError::MalformedPayload(format!("metadata {key} is not UTF-8")))
        })
        .transpose()
}

/// Plaintext form of a payload inside the envelope.
#[derive(Serialize, Deserialize)]
struct SealedPayload {
    metadata: BTreeMap<String, String>,
    data: String,
}

impl From<&Payload> for SealedPayload {
    fn from(payload: &Payload) -> Self {
        Self {
            metadata: payload
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), STANDARD.encode(v)))
                .collect(),
            data: STANDARD.encode(&payload.data),
        }
    }
}

impl SealedPayload {
    fn into_payload(self) -> WorkerResult<Payload> {
        let metadata = self
            .metadata
            .into_iter()
            .map(|(k, v)| STANDARD.decode(v).map(|bytes| (k, bytes)))
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Payload::new(metadata, STANDARD.decode(self.data)?))
    }
}
