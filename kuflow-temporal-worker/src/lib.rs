//! Encrypted payload pipeline for KuFlow Temporal workers.
//!
//! A workflow started with the `x-kuflow-encoding` headers runs encrypted:
//! its results, the arguments of every activity it starts, its signals and
//! its children are sealed under the key named in the headers. The pieces:
//!
//! - [`EncryptionInterceptor`] reads the posture from inbound headers and
//!   propagates it to every outbound call
//! - [`EncryptionPayloadConverter`] stamps marked values with their key id
//! - [`EncryptionPayloadCodec`] seals stamped payloads and opens sealed ones
//! - [`KeyCache`] keeps fetched keys for a sliding TTL
//! - [`WorkerConnection`] wires them together for one worker
//!
//! # Example
//!
//! ```no_run
//! use kuflow_kms::StaticKeyStore;
//! use kuflow_temporal_worker::{EncryptionState, Value, WorkerConfig, WorkerConnection};
//! use std::sync::Arc;
//!
//! # async fn run() -> kuflow_temporal_worker::WorkerResult<()> {
//! let store = Arc::new(StaticKeyStore::with_keys([("key-42", vec![7u8; 32])]));
//! let connection = WorkerConnection::new(WorkerConfig::new("orders"), store)?;
//!
//! let value = Value::from(serde_json::json!("hello")).wrap(&EncryptionState::active("key-42"));
//! let sealed = connection.to_payloads(&[value]).await?;
//! let opened = connection.from_payloads(sealed).await?;
//! assert_eq!(opened, vec![serde_json::json!("hello")]);
//!
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod codec;
mod config;
mod connection;
mod converter;
mod error;
mod instrumentation;
mod interceptor;
mod payload;
mod registry;

pub use cache::KeyCache;
pub use codec::{EncryptionPayloadCodec, PayloadCodec};
pub use config::{EncryptionConfig, MAX_CACHE_DURATION_SECS, WorkerConfig};
pub use connection::WorkerConnection;
pub use converter::EncryptionPayloadConverter;
pub use error::{WorkerError, WorkerResult};
pub use instrumentation::{
    EncryptionState, EncryptionWrapper, Value, add_encryption_encoding,
    mark_objects_to_be_encrypted, retrieve_encryption_state,
};
pub use interceptor::{
    ActivityInbound, ContinueAsNewInput, EncryptionActivityInbound, EncryptionInterceptor,
    EncryptionWorkflowInbound, EncryptionWorkflowOutbound, ExecuteActivityInput,
    ExecuteWorkflowInput, HandleQueryInput, HandleUpdateInput, SignalChildWorkflowInput,
    SignalExternalWorkflowInput, StartActivityInput, StartChildWorkflowInput,
    StartLocalActivityInput, WorkflowInbound, WorkflowOutbound,
};
pub use payload::{
    ENCODING_ENCRYPTED, ENCODING_JSON_PLAIN, HEADER_ENCODING_ENCRYPTED_KEY_ID, HEADER_ENCODING_KEY,
    Headers, JsonPayloadConverter, METADATA_ENCODING_ENCRYPTED_KEY_ID, METADATA_ENCODING_KEY,
    Payload, PayloadConverter,
};
pub use registry::WorkerRegistry;
