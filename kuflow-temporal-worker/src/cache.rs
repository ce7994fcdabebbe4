//! TTL cache with per-key load locking.
//!
//! Values are loaded lazily through a caller-supplied async loader. Hits take
//! the fast path and only touch the entry map; misses serialize on a per-key
//! async mutex so that concurrent misses for the same key run the loader once
//! while distinct keys load in parallel.
//!
//! Expiry is sliding: every hit pushes the entry's deadline `ttl` into the
//! future. A background task sweeps expired entries every
//! `cleanup_interval`, removing the entry and its lock together while holding
//! that lock.

use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Deadline used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

struct CacheEntry<V> {
    value: V,
    expire_at: Instant,
}

struct CacheInner<V> {
    ttl: Duration,
    entries: DashMap<String, CacheEntry<V>>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl<V: Clone> CacheInner<V> {
    fn deadline(&self, now: Instant) -> Instant {
        now.checked_add(self.ttl)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now)
    }

    /// Fast path: returns a live value and slides its expiry.
    fn touch(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entry = self.entries.get_mut(key)?;
        if entry.expire_at <= now {
            return None;
        }
        entry.expire_at = self.deadline(now);
        Some(entry.value.clone())
    }

    fn find(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        (entry.expire_at > Instant::now()).then(|| entry.value.clone())
    }

    fn put(&self, key: &str, value: V) {
        let expire_at = self.deadline(Instant::now());
        self.entries
            .insert(key.to_string(), CacheEntry { value, expire_at });
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.locks.entry(key.to_string()).or_default().value().clone()
    }

    fn is_current_lock(&self, key: &str, lock: &Arc<AsyncMutex<()>>) -> bool {
        self.locks
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), lock))
    }

    /// Removes `key` and its lock if the entry is still expired at `now`.
    /// The caller must hold the key's lock.
    fn evict_locked(&self, key: &str, now: Instant) -> bool {
        // A hit may have slid the expiry since the scan.
        let evicted = self
            .entries
            .remove_if(key, |_, entry| entry.expire_at <= now)
            .is_some();
        if evicted {
            self.locks.remove(key);
            info!(key, "removed key from cache");
        }
        evicted
    }

    async fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.expire_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        for key in expired {
            let lock = self.lock_for(&key);
            let _guard = lock.lock().await;

            self.evict_locked(&key, now);
        }

        // Locks left behind by failed loads, unless a caller still holds one.
        self.locks.retain(|key, lock| {
            self.entries.contains_key(key) || Arc::strong_count(lock) > 1
        });
    }
}

/// A concurrency-safe cache of lazily loaded values with sliding expiry.
pub struct KeyCache<V> {
    inner: Arc<CacheInner<V>>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl<V> KeyCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache and starts its cleanup task.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new(ttl: Duration, cleanup_interval: Duration) -> Self {
        let inner = Arc::new(CacheInner {
            ttl,
            entries: DashMap::new(),
            locks: DashMap::new(),
        });
        let cleanup = tokio::spawn(cleanup_loop(Arc::downgrade(&inner), cleanup_interval));

        Self {
            inner,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    /// Returns the cached value for `key`, running `loader` on a miss.
    ///
    /// Concurrent misses for the same key wait on one another, so the loader
    /// runs at most once per wave of misses. A loader error is returned
    /// unchanged and nothing is cached, so the next call retries.
    pub async fn get<F, Fut, E>(&self, key: &str, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.inner.touch(key) {
            return Ok(value);
        }

        let _guard = loop {
            let lock = self.inner.lock_for(key);
            let guard = lock.clone().lock_owned().await;
            // The sweep may have retired this lock while we waited on it.
            if self.inner.is_current_lock(key, &lock) {
                break guard;
            }
        };

        if let Some(value) = self.inner.find(key) {
            return Ok(value);
        }

        let value = loader().await?;
        self.inner.put(key, value.clone());
        info!(key, "loaded key into cache");

        Ok(value)
    }

    /// Returns true if `key` holds a live value. Does not slide its expiry.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.find(key).is_some()
    }

    /// Number of entries, expired or not, still held by the cache.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Number of per-key locks currently allocated.
    pub fn lock_count(&self) -> usize {
        self.inner.locks.len()
    }

    /// Stops the cleanup task and waits for it to finish.
    ///
    /// Cached values stay readable afterwards; they just stop being swept.
    pub async fn close(&self) {
        let handle = self
            .cleanup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let Some(handle) = handle else {
            return;
        };

        handle.abort();
        match handle.await {
            Ok(()) => debug!("cache cleanup task finished"),
            Err(e) if e.is_cancelled() => debug!("cache cleanup task cancelled"),
            Err(e) => warn!(error = %e, "cache cleanup task failed"),
        }
    }
}

impl<V> Drop for KeyCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self
            .cleanup
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl<V> std::fmt::Debug for KeyCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("ttl", &self.inner.ttl)
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

async fn cleanup_loop<V: Clone>(inner: Weak<CacheInner<V>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.sweep().await;
    }
}
