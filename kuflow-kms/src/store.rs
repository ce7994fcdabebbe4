//! The key retrieval seam consumed by the worker's key cache.

use crate::error::{KmsError, KmsResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Resolves a named encryption key to its raw bytes.
///
/// Implementations must be idempotent and free of side effects: the worker
/// may call `retrieve_key` again for the same id after a failure or after
/// the cached copy expires.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetches the raw bytes of the key named `key_id`.
    async fn retrieve_key(&self, key_id: &str) -> KmsResult<Vec<u8>>;
}

/// In-memory key store for tests and local development.
///
/// Counts every call to [`KeyStore::retrieve_key`], hits and misses alike.
#[derive(Debug, Default)]
pub struct StaticKeyStore {
    keys: RwLock<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl StaticKeyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with `keys`.
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        let store = Self::new();
        for (id, bytes) in keys {
            store.insert(id, bytes);
        }
        store
    }

    /// Adds or replaces a key.
    pub fn insert(&self, key_id: impl Into<String>, bytes: Vec<u8>) {
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key_id.into(), bytes);
    }

    /// Removes a key, returning whether it was present.
    pub fn remove(&self, key_id: &str) -> bool {
        self.keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key_id)
            .is_some()
    }

    /// Number of `retrieve_key` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyStore for StaticKeyStore {
    async fn retrieve_key(&self, key_id: &str) -> KmsResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key_id)
            .cloned()
            .ok_or_else(|| KmsError::NotFound(key_id.to_string()))
    }
}
