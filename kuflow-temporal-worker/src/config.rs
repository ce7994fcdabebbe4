//! Worker configuration.

use crate::error::{WorkerError, WorkerResult};
use kuflow_crypto::CipherAlgorithm;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for cache durations: one year, in seconds.
pub const MAX_CACHE_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Settings for the encrypted payload pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Sliding expiry for cached keys, in seconds.
    pub key_ttl_secs: u64,
    /// How often expired keys are swept from the cache, in seconds.
    pub cleanup_interval_secs: u64,
    /// Cipher used to seal outbound payloads.
    pub algorithm: CipherAlgorithm,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_ttl_secs: 60 * 60,
            cleanup_interval_secs: 60,
            algorithm: CipherAlgorithm::Aes256Gcm,
        }
    }
}

impl EncryptionConfig {
    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn validate(&self) -> WorkerResult<()> {
        check_duration("key_ttl_secs", self.key_ttl_secs)?;
        check_duration("cleanup_interval_secs", self.cleanup_interval_secs)
    }
}

fn check_duration(name: &str, secs: u64) -> WorkerResult<()> {
    if secs == 0 {
        return Err(WorkerError::Config(format!("{name} must be positive")));
    }
    if secs > MAX_CACHE_DURATION_SECS {
        return Err(WorkerError::Config(format!(
            "{name} must be at most {MAX_CACHE_DURATION_SECS}"
        )));
    }
    Ok(())
}

/// Configuration for a [`WorkerConnection`](crate::WorkerConnection).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Task queue the worker polls.
    pub task_queue: String,
    /// Workflow types registered on the worker.
    pub workflows: Vec<String>,
    /// Activity types registered on the worker.
    pub activities: Vec<String>,
    /// Payload encryption settings.
    pub encryption: EncryptionConfig,
}

impl WorkerConfig {
    /// Creates a config for `task_queue` with default encryption settings.
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            ..Default::default()
        }
    }

    pub fn with_workflow(mut self, name: impl Into<String>) -> Self {
        self.workflows.push(name.into());
        self
    }

    pub fn with_activity(mut self, name: impl Into<String>) -> Self {
        self.activities.push(name.into());
        self
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.task_queue.trim().is_empty() {
            return Err(WorkerError::Config("task_queue is required".to_string()));
        }
        self.encryption.validate()
    }
}
