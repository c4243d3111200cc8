//! Database types for the storage layer.

use alloy::primitives::{Address, B256};
use poc_core::certificate::PinnedCertificate;
use poc_core::consumer::{ConsumerData, DataSource};
use poc_core::{CommitStatus, CourseDifficulty, ProgressError, RepositoryStatus};
use serde::{Deserialize, Serialize};

/// Errors callers need to branch on.
///
/// Everything else is an opaque [`anyhow::Error`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Unique constraint violated.
    #[error("{0}")]
    Conflict(String),

    /// Entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A value cannot be stored as given.
    #[error("{0}")]
    Invalid(String),

    /// The learning-progress state machine rejected the update.
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Compare-and-swap retries were exhausted.
    #[error("Concurrent update retries exhausted")]
    Contended,

    /// Database or encoding failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Other(err.into())
    }
}

/// Stored consumer data contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerContribution {
    /// Generated id.
    pub id: String,
    /// Contributor wallet.
    pub user_address: Address,
    /// Data source.
    pub source: DataSource,
    /// Claim identifier of the proof. Each proof is accepted once.
    pub proof_id: String,
    /// Extracted figures.
    pub data: ConsumerData,
    /// DataCoins paid, bonus included.
    pub data_coins: u64,
    /// Whether this was the user's first contribution.
    pub first_contribution: bool,
    /// Insert time (unix seconds).
    pub created_at: i64,
}

/// Per-source totals of a user's contributions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTotals {
    /// Accepted contributions.
    pub contributions: u64,
    /// DataCoins paid.
    pub data_coins: u64,
}

/// Registered learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Wallet address (primary key).
    pub address: Address,
    /// Display name.
    pub name: String,
    /// Contact email, unique across users.
    pub email: String,
    /// Registration time.
    pub created_at: i64,
    /// Last update time.
    pub updated_at: i64,
}

/// Module of a course definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    /// 1-based module id.
    pub id: u32,
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Number of lessons.
    #[serde(default)]
    pub lessons: u32,
    /// Display duration.
    #[serde(default)]
    pub duration: String,
    /// Reading material links.
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Assignment of a course definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAssignment {
    /// Assignment id.
    pub id: String,
    /// Heading.
    pub heading: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Whether a repository link may be submitted.
    #[serde(default)]
    pub allow_repo_submission: bool,
}

/// Course catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// On-chain course id.
    pub id: u64,
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Difficulty tier.
    pub difficulty: CourseDifficulty,
    /// Required stake in ETH (decimal string).
    pub stake_amount: String,
    /// Ordered modules.
    pub modules: Vec<CourseModule>,
    /// Assignments.
    #[serde(default)]
    pub assignments: Vec<CourseAssignment>,
    /// Whether repositories may be submitted for this course.
    #[serde(default)]
    pub allow_repo_submission: bool,
    /// Accepting enrollments.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Visible in the catalogue.
    #[serde(default = "default_true")]
    pub published: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: i64,
    /// Last update time.
    #[serde(default)]
    pub updated_at: i64,
}

fn default_true() -> bool {
    true
}

impl Course {
    /// Number of modules.
    pub fn total_modules(&self) -> u32 {
        self.modules.len() as u32
    }

    /// Whether the course defines the assignment.
    pub fn has_assignment(&self, assignment_id: &str) -> bool {
        self.assignments.iter().any(|a| a.id == assignment_id)
    }
}

/// Commit under admin review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// Git SHA.
    pub sha: String,
    /// Commit message.
    pub message: String,
    /// Author name.
    pub author: String,
    /// Author email.
    #[serde(default)]
    pub author_email: String,
    /// Author date (ISO 8601).
    pub date: String,
    /// Added lines.
    #[serde(default)]
    pub additions: u64,
    /// Deleted lines.
    #[serde(default)]
    pub deletions: u64,
    /// Files touched.
    #[serde(default)]
    pub files_changed: u64,
    /// Review status.
    #[serde(default)]
    pub status: CommitStatus,
    /// Review time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<i64>,
    /// Reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    /// DataCoins granted for this commit.
    #[serde(default)]
    pub data_coins_earned: u64,
    /// Reviewer notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_notes: Option<String>,
}

/// Repository submission fields supplied by the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRepository {
    /// Owner wallet.
    pub user_address: Address,
    /// Owner display name.
    pub user_name: String,
    /// Owner email.
    pub user_email: String,
    /// GitHub login.
    #[serde(default)]
    pub github_username: String,
    /// Repository URL.
    pub repo_url: String,
    /// Repository name.
    pub repo_name: String,
    /// Repository owner login.
    pub repo_owner: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Primary language.
    #[serde(default)]
    pub language: Option<String>,
    /// Star count.
    #[serde(default)]
    pub stars: u64,
    /// Fork count.
    #[serde(default)]
    pub forks: u64,
    /// Private repository.
    #[serde(default)]
    pub is_private: bool,
}

/// Submitted repository with its commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Generated id.
    pub id: String,
    /// Submission fields.
    #[serde(flatten)]
    pub details: NewRepository,
    /// Review status.
    pub status: RepositoryStatus,
    /// Submission time.
    pub submitted_at: i64,
    /// Review time.
    pub reviewed_at: Option<i64>,
    /// Reviewer.
    pub reviewed_by: Option<String>,
    /// Sum of DataCoins granted to its commits.
    pub data_coins_earned: u64,
    /// Number of commits.
    pub total_commits: u64,
    /// Number of verified commits.
    pub verified_commits: u64,
    /// Commits in submission order.
    pub commits: Vec<Commit>,
}

/// Aggregate repository review statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    /// All repositories.
    pub total_repositories: u64,
    /// Awaiting review.
    pub pending_repositories: u64,
    /// Approved.
    pub approved_repositories: u64,
    /// Rejected.
    pub rejected_repositories: u64,
    /// All commits.
    pub total_commits: u64,
    /// Verified commits.
    pub verified_commits: u64,
    /// DataCoins granted across commits.
    pub total_data_coins_earned: u64,
}

/// Pinned certificate with its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    /// Owner wallet.
    pub user_address: Address,
    /// Course id.
    pub course_id: u64,
    /// Pinned document.
    pub certificate: PinnedCertificate,
    /// Insert time.
    pub created_at: i64,
}

/// Origin of a transaction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionSource {
    /// Written through the API.
    Api,
    /// Decoded from a chain event.
    Chain,
}

impl TransactionSource {
    /// Column value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::Api => "api",
            TransactionSource::Chain => "chain",
        }
    }
}

/// Sync state tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Last processed block number
    pub last_block_number: u64,

    /// Hash of the last processed block
    pub last_block_hash: B256,

    /// Timestamp of last update
    pub updated_at: i64,

    /// Chain ID
    pub chain_id: u64,
}
