//! Contribution verification: AI verifier client, GitHub client and local
//! permit signing.

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::Eip712Domain;
use anyhow::{Context, Result};
use poc_core::permit::{commit_hash, contribution_metadata, permit_domain, PermitData, SignedPermit};
use poc_core::{MANUAL_PERMIT_REPUTATION, PERMIT_TTL_SECS};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::storage::Commit;

const DEFAULT_AI_SERVICE_URL: &str = "https://ai-verifier.vercel.app";
const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const COMMITS_PER_PAGE: u32 = 100;

/// Request forwarded to the AI verifier's `/verify_commit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCommitRequest {
    /// `owner/name` of the repository.
    pub repo: String,
    /// Commit SHA.
    pub sha: String,
    /// Commit message override used for scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Diff override used for scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// SBT recipient.
    pub wallet: Address,
    /// Permit expiry (unix seconds).
    pub expiry: u64,
    /// Chain of the ProofOfContribution contract.
    pub chain_id: u64,
    /// ProofOfContribution contract.
    pub verifying_contract: Address,
    /// Pinned metadata URI.
    #[serde(rename = "tokenURI", default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
}

/// Client of the external AI verification service.
#[derive(Clone)]
pub struct AiVerifierClient {
    client: Client,
    base_url: String,
}

impl AiVerifierClient {
    /// Build a client for the service at `base_url`.
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("poc-indexer/verification")
            .build()
            .context("Failed to build AI verifier HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Construct a client from environment variables.
    ///
    /// - `AI_SERVICE_URL` (default: the hosted verifier)
    /// - `AI_SERVICE_TIMEOUT_SECS` (default: 20)
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("AI_SERVICE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AI_SERVICE_URL.to_string());

        let timeout_secs = std::env::var("AI_SERVICE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(base_url, timeout_secs)
    }

    /// Ask the service to score the commit and sign a permit.
    pub async fn verify_commit(&self, request: &VerifyCommitRequest) -> Result<SignedPermit> {
        let url = format!("{}/verify_commit", self.base_url);
        debug!(repo = %request.repo, sha = %request.sha, "Requesting AI verification");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .context("Failed to reach AI verifier")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("AI verifier returned {}: {}", status, body);
        }

        let permit: SignedPermit = response
            .json()
            .await
            .context("Invalid AI verifier response")?;

        info!(
            repo = %request.repo,
            sha = %request.sha,
            reputation = permit.permit.reputation,
            "AI verifier signed permit"
        );
        Ok(permit)
    }
}

#[derive(Debug, Deserialize)]
struct GithubAuthor {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    date: String,
}

#[derive(Debug, Deserialize)]
struct GithubCommitInfo {
    message: String,
    author: Option<GithubAuthor>,
}

#[derive(Debug, Default, Deserialize)]
struct GithubStats {
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

#[derive(Debug, Deserialize)]
struct GithubFile {
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
    commit: GithubCommitInfo,
    #[serde(default)]
    stats: Option<GithubStats>,
    #[serde(default)]
    files: Option<Vec<GithubFile>>,
}

impl GithubCommit {
    fn into_commit(self) -> Commit {
        let author = self.commit.author.unwrap_or(GithubAuthor {
            name: String::new(),
            email: String::new(),
            date: String::new(),
        });
        let stats = self.stats.unwrap_or_default();

        Commit {
            sha: self.sha,
            message: self.commit.message,
            author: author.name,
            author_email: author.email,
            date: author.date,
            additions: stats.additions,
            deletions: stats.deletions,
            files_changed: self.files.map(|f| f.len() as u64).unwrap_or(0),
            status: Default::default(),
            verified_at: None,
            verified_by: None,
            data_coins_earned: 0,
            verification_notes: None,
        }
    }
}

/// Message, concatenated patches and identifier of one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDiff {
    /// Commit message.
    pub message: String,
    /// Patches of every file, newline separated.
    pub diff: String,
    /// Author email.
    pub author_email: String,
    /// Cross-repository commit identifier.
    pub commit_hash: B256,
}

/// Minimal GitHub REST client.
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubClient {
    /// Build a client, optionally authenticated.
    pub fn new(api_base: String, token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Proof-of-Contribution-App")
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Construct a client from environment variables.
    ///
    /// - `GITHUB_TOKEN` (optional)
    /// - `GITHUB_API_URL` (default: https://api.github.com)
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let api_base =
            std::env::var("GITHUB_API_URL").unwrap_or_else(|_| DEFAULT_GITHUB_API.to_string());
        Self::new(api_base, token, DEFAULT_TIMEOUT_SECS)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("Failed to reach GitHub")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GitHub API error: {} for {}", status, url);
        }
        Ok(response)
    }

    /// Most recent commits of a repository (one page of 100).
    pub async fn list_commits(&self, owner: &str, repo: &str) -> Result<Vec<Commit>> {
        let url = format!(
            "{}/repos/{}/{}/commits?per_page={}",
            self.api_base, owner, repo, COMMITS_PER_PAGE
        );

        let commits: Vec<GithubCommit> = self
            .get(&url)
            .await?
            .json()
            .await
            .context("Invalid GitHub commits response")?;

        Ok(commits.into_iter().map(GithubCommit::into_commit).collect())
    }

    /// Message and diff of one commit of `repo` (`owner/name`).
    pub async fn commit_diff(&self, repo: &str, sha: &str) -> Result<CommitDiff> {
        let url = format!("{}/repos/{}/commits/{}", self.api_base, repo, sha);

        let commit: GithubCommit = self
            .get(&url)
            .await?
            .json()
            .await
            .context("Invalid GitHub commit response")?;

        Ok(commit_diff_from(repo, commit))
    }
}

fn commit_diff_from(repo: &str, commit: GithubCommit) -> CommitDiff {
    let author_email = commit
        .commit
        .author
        .as_ref()
        .map(|a| a.email.clone())
        .unwrap_or_default();

    let diff = commit
        .files
        .unwrap_or_default()
        .into_iter()
        .filter_map(|f| f.patch.filter(|p| !p.is_empty()))
        .collect::<Vec<_>>()
        .join("\n");

    CommitDiff {
        commit_hash: commit_hash(repo, &commit.sha, &author_email),
        message: commit.commit.message,
        diff,
        author_email,
    }
}

/// Split `owner/name` or a GitHub URL into owner and repository name.
pub fn parse_repository(input: &str) -> Option<(String, String)> {
    let trimmed = input.trim().trim_end_matches('/');
    let path = match trimmed.find("github.com/") {
        Some(idx) => &trimmed[idx + "github.com/".len()..],
        None => trimmed,
    };

    let mut parts = path.split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some((
        owner.to_string(),
        name.trim_end_matches(".git").to_string(),
    ))
}

/// NFT metadata of a contribution permit.
///
/// Manual permits carry their fixed reputation; AI-scored ones are pinned
/// before the score is known.
pub fn build_contribution_metadata(repo: &str, sha: &str, manual: bool) -> Value {
    if manual {
        contribution_metadata(repo, sha, Some(MANUAL_PERMIT_REPUTATION), "manual")
    } else {
        contribution_metadata(repo, sha, None, "ai")
    }
}

/// Signs contribution permits with a local verifier key.
pub struct PermitSigner {
    signer: PrivateKeySigner,
    domain: Eip712Domain,
}

impl PermitSigner {
    /// Create a signer for the contract at `verifying_contract`.
    pub fn new(signer: PrivateKeySigner, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            signer,
            domain: permit_domain(chain_id, verifying_contract),
        }
    }

    /// Parse a hex private key.
    pub fn from_key(key: &str, chain_id: u64, verifying_contract: Address) -> Result<Self> {
        crate::config::validate_private_key("Permit signer key", key)?;
        let signer: PrivateKeySigner = key
            .trim_start_matches("0x")
            .parse()
            .context("Invalid permit signer key")?;
        Ok(Self::new(signer, chain_id, verifying_contract))
    }

    /// Address permits recover to.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// EIP-712 domain permits are signed under.
    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Sign `permit`.
    pub fn sign(&self, permit: PermitData) -> Result<SignedPermit> {
        let hash = permit.signing_hash(&self.domain);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .context("Failed to sign permit")?;

        Ok(SignedPermit {
            permit,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// Sign a manual-review permit worth the fixed manual reputation,
    /// valid for one hour from `now`.
    pub fn sign_manual(
        &self,
        to: Address,
        repo: &str,
        sha: &str,
        token_uri: String,
        now: u64,
    ) -> Result<SignedPermit> {
        self.sign(PermitData {
            to,
            commit_hash: commit_hash(repo, sha, &poc_core::address_key(&to)),
            reputation: MANUAL_PERMIT_REPUTATION,
            expiry: now + PERMIT_TTL_SECS,
            token_uri,
        })
    }
}
