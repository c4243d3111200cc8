//! Core types for Proof of Contribution.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Parse a wallet address from user input.
///
/// Accepts mixed-case and lowercase hex with a `0x` prefix. Checksums are not
/// enforced because wallets and the frontend disagree on casing.
pub fn normalize_address(input: &str) -> Result<Address, CoreError> {
    let trimmed = input.trim();
    if !trimmed.starts_with("0x") || trimmed.len() != 42 {
        return Err(CoreError::InvalidAddress(trimmed.to_string()));
    }
    let bytes = hex::decode(&trimmed[2..]).map_err(|_| CoreError::InvalidAddress(trimmed.to_string()))?;
    Ok(Address::from_slice(&bytes))
}

/// Lowercase `0x`-prefixed storage key for an address.
pub fn address_key(address: &Address) -> String {
    format!("{:#x}", address)
}

/// Kind of a user-facing transaction log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// ETH staked to enroll in a course.
    Stake,
    /// Course completed on-chain.
    Complete,
    /// Stake refunded after completion.
    Refund,
    /// DataCoin reward minted.
    Datacoin,
    /// Soulbound token minted.
    Mint,
}

impl TransactionKind {
    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Stake => "stake",
            TransactionKind::Complete => "complete",
            TransactionKind::Refund => "refund",
            TransactionKind::Datacoin => "datacoin",
            TransactionKind::Mint => "mint",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stake" => Ok(TransactionKind::Stake),
            "complete" => Ok(TransactionKind::Complete),
            "refund" => Ok(TransactionKind::Refund),
            "datacoin" => Ok(TransactionKind::Datacoin),
            "mint" => Ok(TransactionKind::Mint),
            other => Err(CoreError::UnknownTransactionKind(other.to_string())),
        }
    }
}

/// Settlement status of a transaction log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Confirmed.
    #[default]
    Success,
    /// Sent but not yet confirmed.
    Pending,
    /// Reverted or rejected.
    Failed,
}

impl TransactionStatus {
    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TransactionStatus::Success),
            "pending" => Ok(TransactionStatus::Pending),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(CoreError::UnknownTransactionStatus(other.to_string())),
        }
    }
}

/// Denormalized transaction log entry consumed by the dashboard.
///
/// Sourced from API writes or decoded on-chain events. Amounts are decimal
/// strings in whole tokens (ETH or DataCoin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Transaction hash, or a synthetic id for off-chain records.
    pub hash: String,

    /// Entry kind.
    #[serde(rename = "type")]
    pub kind: TransactionKind,

    /// Decimal amount.
    pub amount: String,

    /// Course id as a string (`"0"` when not course related).
    pub course_id: String,

    /// Unix timestamp in seconds.
    pub timestamp: i64,

    /// Settlement status.
    #[serde(default)]
    pub status: TransactionStatus,

    /// Block number for on-chain entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,

    /// Certificate CID attached to completion entries.
    #[serde(
        rename = "certificateCID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_cid: Option<String>,

    /// Free-form reason (reward type, mint reason).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransactionRecord {
    /// Amount parsed as a float, zero when unparsable.
    pub fn amount_f64(&self) -> f64 {
        self.amount.trim().parse::<f64>().unwrap_or(0.0)
    }
}

/// Sort transactions newest first, ties broken by hash for stable output.
pub fn sort_newest_first(txs: &mut [TransactionRecord]) {
    txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.hash.cmp(&b.hash)));
}

/// Course difficulty tier, used for completion rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CourseDifficulty {
    /// Entry level.
    Beginner,
    /// Mid level.
    Intermediate,
    /// Expert level.
    Advanced,
}

impl CourseDifficulty {
    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CourseDifficulty::Beginner => "Beginner",
            CourseDifficulty::Intermediate => "Intermediate",
            CourseDifficulty::Advanced => "Advanced",
        }
    }
}

impl FromStr for CourseDifficulty {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(CourseDifficulty::Beginner),
            "Intermediate" => Ok(CourseDifficulty::Intermediate),
            "Advanced" => Ok(CourseDifficulty::Advanced),
            other => Err(CoreError::UnknownDifficulty(other.to_string())),
        }
    }
}

/// Admin review status of a submitted repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    /// Awaiting review.
    #[default]
    Pending,
    /// Accepted.
    Approved,
    /// Declined.
    Rejected,
}

impl RepositoryStatus {
    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RepositoryStatus::Pending => "pending",
            RepositoryStatus::Approved => "approved",
            RepositoryStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for RepositoryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RepositoryStatus::Pending),
            "approved" => Ok(RepositoryStatus::Approved),
            "rejected" => Ok(RepositoryStatus::Rejected),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Admin review status of a single commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    /// Awaiting review.
    #[default]
    Pending,
    /// Accepted.
    Verified,
    /// Declined.
    Rejected,
}

impl CommitStatus {
    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CommitStatus::Pending => "pending",
            CommitStatus::Verified => "verified",
            CommitStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for CommitStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommitStatus::Pending),
            "verified" => Ok(CommitStatus::Verified),
            "rejected" => Ok(CommitStatus::Rejected),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        let addr = normalize_address("0xAbCdEf0123456789aBcDeF0123456789AbCdEf01").unwrap();
        assert_eq!(
            address_key(&addr),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );

        assert!(normalize_address("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("0xzzcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn test_transaction_record_wire_format() {
        let json = serde_json::json!({
            "hash": "0xabc",
            "type": "complete",
            "amount": "0.1",
            "courseId": "3",
            "timestamp": 1_700_000_000,
            "status": "success",
            "blockNumber": 42,
            "certificateCID": "bafy"
        });

        let tx: TransactionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(tx.kind, TransactionKind::Complete);
        assert_eq!(tx.block_number, Some(42));
        assert_eq!(tx.certificate_cid.as_deref(), Some("bafy"));
        assert_eq!(tx.reason, None);

        let back = serde_json::to_value(&tx).unwrap();
        assert_eq!(back["type"], "complete");
        assert_eq!(back["certificateCID"], "bafy");
        assert!(back.get("reason").is_none());
    }

    #[test]
    fn test_status_defaults_to_success() {
        let json = serde_json::json!({
            "hash": "0x1",
            "type": "stake",
            "amount": "0.01",
            "courseId": "1",
            "timestamp": 1
        });
        let tx: TransactionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("mint".parse::<TransactionKind>().unwrap(), TransactionKind::Mint);
        assert!("burn".parse::<TransactionKind>().is_err());
        assert_eq!(
            "Advanced".parse::<CourseDifficulty>().unwrap(),
            CourseDifficulty::Advanced
        );
        assert!("advanced".parse::<CourseDifficulty>().is_err());
        assert_eq!(
            "approved".parse::<RepositoryStatus>().unwrap(),
            RepositoryStatus::Approved
        );
        assert_eq!("verified".parse::<CommitStatus>().unwrap(), CommitStatus::Verified);
    }

    #[test]
    fn test_sort_newest_first() {
        let mk = |hash: &str, ts: i64| TransactionRecord {
            hash: hash.to_string(),
            kind: TransactionKind::Stake,
            amount: "0".to_string(),
            course_id: "0".to_string(),
            timestamp: ts,
            status: TransactionStatus::Success,
            block_number: None,
            certificate_cid: None,
            reason: None,
        };
        let mut txs = vec![mk("a", 1), mk("b", 3), mk("c", 2)];
        sort_newest_first(&mut txs);
        let order: Vec<_> = txs.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }
}
