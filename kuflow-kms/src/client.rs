//! HTTP client for the KuFlow REST `kms` endpoint.
//!
//! `GET {endpoint}/kms/keys/{key-id}` returns a [`KmsKey`] whose `value` is
//! the base64-encoded key. Authentication reuses the REST API client
//! credentials.

use crate::error::{KmsError, KmsResult};
use crate::store::KeyStore;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// REST API version appended to the endpoint when missing.
pub const API_VERSION: &str = "v2024-06-14";

/// Default KuFlow REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.kuflow.com/v2024-06-14";

/// Configuration for [`KmsClient`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsConfig {
    /// Base URL of the KuFlow REST API.
    pub endpoint: String,
    /// Application client id.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Allow `http://` endpoints. Only meant for local testing.
    pub allow_insecure_connection: bool,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: 30,
            allow_insecure_connection: false,
        }
    }
}

impl std::fmt::Debug for KmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsConfig")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("allow_insecure_connection", &self.allow_insecure_connection)
            .finish()
    }
}

/// Key resource returned by the KMS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmsKey {
    pub id: String,
    /// Base64-encoded key bytes.
    pub value: String,
}

/// [`KeyStore`] backed by the KuFlow REST API.
#[derive(Debug, Clone)]
pub struct KmsClient {
    base_url: String,
    authorization: String,
    client: Client,
}

impl KmsClient {
    /// Creates a client, validating the configuration.
    pub fn new(config: &KmsConfig) -> KmsResult<Self> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(KmsError::Config(
                "client_id and client_secret are required".to_string(),
            ));
        }
        if config.timeout_secs == 0 {
            return Err(KmsError::Config("timeout_secs must be positive".to_string()));
        }
        if !config.allow_insecure_connection && !config.endpoint.starts_with("https://") {
            return Err(KmsError::Config(format!(
                "insecure endpoint not allowed: {}",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let credentials = format!("{}:{}", config.client_id, config.client_secret);

        Ok(Self {
            base_url: versioned_endpoint(&config.endpoint),
            authorization: format!("Bearer {}", STANDARD.encode(credentials)),
            client,
        })
    }

    /// Returns the versioned base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the key resource named `key_id`.
    pub async fn retrieve_kms_key(&self, key_id: &str) -> KmsResult<KmsKey> {
        let url = format!("{}/kms/keys/{}", self.base_url, urlencoding::encode(key_id));
        debug!(key_id, "retrieving KMS key");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        Err(match status {
            StatusCode::NOT_FOUND => KmsError::NotFound(key_id.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => KmsError::AccessDenied {
                key_id: key_id.to_string(),
                status: status.as_u16(),
            },
            _ => KmsError::Api {
                status: status.as_u16(),
                message: body,
            },
        })
    }
}

#[async_trait]
impl KeyStore for KmsClient {
    async fn retrieve_key(&self, key_id: &str) -> KmsResult<Vec<u8>> {
        let key = self.retrieve_kms_key(key_id).await?;
        STANDARD
            .decode(key.value.as_bytes())
            .map_err(|e| KmsError::InvalidKey {
                key_id: key_id.to_string(),
                reason: e.to_string(),
            })
    }
}

fn versioned_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with(&format!("/{API_VERSION}")) {
        trimmed.to_string()
    } else {
        format!("{trimmed}/{API_VERSION}")
    }
}
