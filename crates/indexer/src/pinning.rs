//! Pinning of JSON documents to IPFS through Lighthouse or Pinata.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const PINATA_PIN_JSON_URL: &str = "https://api.pinata.cloud/pinning/pinJSONToIPFS";
const LIGHTHOUSE_UPLOAD_URL: &str = "https://node.lighthouse.storage/api/v0/add";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Stores JSON documents and returns their CID.
#[async_trait]
pub trait CertificatePinner: Send + Sync {
    /// Pin `value` and return its content identifier.
    async fn pin_json(&self, value: &Value) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct PinataResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pinata `pinJSONToIPFS` client.
#[derive(Clone)]
pub struct PinataPinner {
    client: Client,
    endpoint: String,
    jwt: String,
}

impl PinataPinner {
    /// Build a pinner authenticating with a Pinata JWT.
    pub fn new(jwt: String, endpoint: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("poc-indexer/pinning")
            .build()
            .context("Failed to build Pinata HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| PINATA_PIN_JSON_URL.to_string()),
            jwt,
        })
    }

    /// Construct a pinner from environment variables.
    ///
    /// - `PINATA_JWT` (unset: no pinner)
    /// - `PINATA_ENDPOINT` (default: the public pinJSONToIPFS endpoint)
    /// - `PINATA_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Option<Self>> {
        let Some(jwt) = std::env::var("PINATA_JWT")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        let endpoint = std::env::var("PINATA_ENDPOINT").ok();

        let timeout_secs = std::env::var("PINATA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Some(Self::new(jwt, endpoint, timeout_secs)?))
    }
}

#[async_trait]
impl CertificatePinner for PinataPinner {
    async fn pin_json(&self, value: &Value) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.jwt)
            .json(&serde_json::json!({ "pinataContent": value }))
            .send()
            .await
            .context("Failed to reach Pinata")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Pinata upload failed with {}: {}", status, body);
        }

        let pinned: PinataResponse = response
            .json()
            .await
            .context("Invalid Pinata response")?;

        info!(cid = %pinned.ipfs_hash, "Pinned JSON to IPFS");
        Ok(pinned.ipfs_hash)
    }
}

#[derive(Debug, Deserialize)]
struct LighthouseResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Lighthouse storage upload client.
#[derive(Clone)]
pub struct LighthousePinner {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl LighthousePinner {
    /// Build a pinner authenticating with a Lighthouse API key.
    pub fn new(api_key: String, endpoint: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("poc-indexer/pinning")
            .build()
            .context("Failed to build Lighthouse HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| LIGHTHOUSE_UPLOAD_URL.to_string()),
            api_key,
        })
    }

    /// Construct a pinner from `LIGHTHOUSE_API_KEY`, `LIGHTHOUSE_ENDPOINT`
    /// and `LIGHTHOUSE_TIMEOUT_SECS`. Unset key: no pinner.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(api_key) = std::env::var("LIGHTHOUSE_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        else {
            return Ok(None);
        };

        let timeout_secs = std::env::var("LIGHTHOUSE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Some(Self::new(
            api_key,
            std::env::var("LIGHTHOUSE_ENDPOINT").ok(),
            timeout_secs,
        )?))
    }
}

#[async_trait]
impl CertificatePinner for LighthousePinner {
    async fn pin_json(&self, value: &Value) -> Result<String> {
        let body = serde_json::to_vec(value)?;
        let part = reqwest::multipart::Part::bytes(body)
            .file_name("certificate.json")
            .mime_str("application/json")
            .context("Invalid upload part")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to reach Lighthouse")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Lighthouse upload failed with {}: {}", status, body);
        }

        let pinned: LighthouseResponse = response
            .json()
            .await
            .context("Invalid Lighthouse response")?;

        info!(cid = %pinned.hash, "Uploaded JSON to Lighthouse");
        Ok(pinned.hash)
    }
}

/// Computes the CID locally without uploading.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPinner;

#[async_trait]
impl CertificatePinner for LocalPinner {
    async fn pin_json(&self, value: &Value) -> Result<String> {
        let cid = poc_core::certificate::json_cid(value)
            .context("Failed to compute certificate CID")?
            .to_string();
        debug!(cid = %cid, "Pinning not configured, computed CID locally");
        Ok(cid)
    }
}
