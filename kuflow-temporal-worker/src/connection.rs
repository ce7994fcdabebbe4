//! Wiring of the encrypted payload pipeline for one worker.

use crate::codec::{EncryptionPayloadCodec, PayloadCodec};
use crate::config::WorkerConfig;
use crate::converter::EncryptionPayloadConverter;
use crate::error::{WorkerError, WorkerResult};
use crate::instrumentation::Value;
use crate::interceptor::EncryptionInterceptor;
use crate::payload::Payload;
use crate::registry::WorkerRegistry;
use kuflow_kms::KeyStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Owns the converter, codec, key cache, and interceptor a worker hands to
/// its host runtime.
///
/// The connection must be closed to stop the key cache's cleanup task.
/// After [`close`](Self::close) every payload operation fails with
/// [`WorkerError::Closed`].
#[derive(Debug)]
pub struct WorkerConnection {
    config: WorkerConfig,
    registry: WorkerRegistry,
    converter: EncryptionPayloadConverter,
    codec: Arc<EncryptionPayloadCodec>,
    interceptor: EncryptionInterceptor,
    closed: AtomicBool,
}

impl WorkerConnection {
    /// Validates `config` and builds the pipeline.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: WorkerConfig, key_store: Arc<dyn KeyStore>) -> WorkerResult<Self> {
        config.validate()?;
        let registry = WorkerRegistry::from_config(&config)?;
        let codec = EncryptionPayloadCodec::from_config(&config.encryption, key_store);

        info!(
            task_queue = %config.task_queue,
            workflows = ?registry.workflow_types().collect::<Vec<_>>(),
            activities = ?registry.activity_types().collect::<Vec<_>>(),
            algorithm = %config.encryption.algorithm,
            "worker connection ready"
        );

        Ok(Self {
            config,
            registry,
            converter: EncryptionPayloadConverter::json(),
            codec: Arc::new(codec),
            interceptor: EncryptionInterceptor::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn converter(&self) -> &EncryptionPayloadConverter {
        &self.converter
    }

    pub fn codec(&self) -> Arc<EncryptionPayloadCodec> {
        Arc::clone(&self.codec)
    }

    pub fn interceptor(&self) -> &EncryptionInterceptor {
        &self.interceptor
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Converts values to wire payloads, sealing those marked for encryption.
    pub async fn to_payloads(&self, values: &[Value]) -> WorkerResult<Vec<Payload>> {
        self.ensure_open()?;
        let payloads = self.converter.to_payloads(values)?;
        self.codec.encode(payloads).await
    }

    /// Opens sealed payloads and converts them back to values.
    pub async fn from_payloads(
        &self,
        payloads: Vec<Payload>,
    ) -> WorkerResult<Vec<serde_json::Value>> {
        self.ensure_open()?;
        let payloads = self.codec.decode(payloads).await?;
        payloads
            .iter()
            .map(|payload| self.converter.from_payload(payload))
            .collect()
    }

    /// Stops the key cache's cleanup task. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.codec.close().await;
        info!(task_queue = %self.config.task_queue, "worker connection closed");
    }

    fn ensure_open(&self) -> WorkerResult<()> {
        if self.is_closed() {
            return Err(WorkerError::Closed);
        }
        Ok(())
    }
}
