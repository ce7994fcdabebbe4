//! Key management for the KuFlow encrypted payload pipeline.
//!
//! The worker never holds encryption keys in its configuration. Each key is
//! named by an id carried in workflow headers and resolved at runtime through
//! a [`KeyStore`]:
//!
//! - [`KmsClient`] talks to the KuFlow REST API
//! - [`StaticKeyStore`] serves keys from memory for tests
//!
//! # Example
//!
//! ```no_run
//! use kuflow_kms::{KeyStore, KmsClient, KmsConfig};
//!
//! # async fn run() -> kuflow_kms::KmsResult<()> {
//! let client = KmsClient::new(&KmsConfig {
//!     client_id: "app-id".to_string(),
//!     client_secret: "app-secret".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let key = client.retrieve_key("key-42").await?;
//! assert_eq!(key.len(), 32);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod store;

pub use client::{API_VERSION, DEFAULT_ENDPOINT, KmsClient, KmsConfig, KmsKey};
pub use error::{KmsError, KmsResult};
pub use store::{KeyStore, StaticKeyStore};
