//! Where transactions come from.

use async_trait::async_trait;
use poc_core::{address_key, Address, TransactionKind, TransactionRecord, TransactionStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SdkError};

/// Transaction to append to a user's log. Omitted fields are filled in by
/// the server (synthetic hash, zero amount, current time, `success`).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Transaction hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Decimal amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Course id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    /// Unix timestamp in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Settlement status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
    /// Block number for on-chain entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    /// Certificate CID for completion entries.
    #[serde(rename = "certificateCID", skip_serializing_if = "Option::is_none")]
    pub certificate_cid: Option<String>,
    /// Free-form reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NewTransaction {
    /// Entry of the given kind with every optional field unset.
    pub fn new(kind: TransactionKind) -> Self {
        Self {
            kind,
            hash: None,
            amount: None,
            course_id: None,
            timestamp: None,
            status: None,
            block_number: None,
            certificate_cid: None,
            reason: None,
        }
    }
}

/// Backend holding the transaction log.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// All transactions of `user`.
    async fn list(&self, user: Address) -> Result<Vec<TransactionRecord>>;

    /// Append one transaction and return the stored record.
    async fn add(&self, user: Address, tx: &NewTransaction) -> Result<TransactionRecord>;
}

/// [`TransactionSource`] backed by the JSON API.
#[derive(Debug, Clone)]
pub struct HttpTransactionSource {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ListResponse {
    transactions: Vec<TransactionRecord>,
}

#[derive(Deserialize)]
struct AddResponse {
    transaction: TransactionRecord,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddRequest<'a> {
    user_address: String,
    #[serde(flatten)]
    tx: &'a NewTransaction,
}

impl HttpTransactionSource {
    /// Source talking to the API at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("poc-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(http, base_url)
    }

    /// Source reusing an existing HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SdkError::InvalidBaseUrl(base_url));
        }
        Ok(Self { http, base_url })
    }

    fn url(&self) -> String {
        format!("{}/v1/transactions", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => ("http_error".to_string(), body),
        };
        Err(SdkError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl TransactionSource for HttpTransactionSource {
    async fn list(&self, user: Address) -> Result<Vec<TransactionRecord>> {
        debug!(user = %user, "Fetching transactions");
        let response = self
            .http
            .get(self.url())
            .query(&[("userAddress", address_key(&user))])
            .send()
            .await?;
        let body: ListResponse = Self::check(response).await?.json().await?;
        Ok(body.transactions)
    }

    async fn add(&self, user: Address, tx: &NewTransaction) -> Result<TransactionRecord> {
        let request = AddRequest {
            user_address: address_key(&user),
            tx,
        };
        let response = self.http.post(self.url()).json(&request).send().await?;
        let body: AddResponse = Self::check(response).await?.json().await?;
        Ok(body.transaction)
    }
}
