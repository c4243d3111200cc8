//! Statistics derived from a user's transaction log.
//!
//! Reputation, SBT counts and the activity feed are never stored; they are
//! recomputed from the transaction list whenever it changes.

use alloy_primitives::Address;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ACTIVITY_FEED_LIMIT, RECENT_GAINS_LIMIT, RECENT_SBT_LIMIT, REPUTATION_COURSE_COMPLETION,
    REPUTATION_PER_DATACOIN, REPUTATION_SBT_MINT, REPUTATION_STAKE,
};
use crate::types::{sort_newest_first, TransactionKind, TransactionRecord, TransactionStatus};

/// Reputation split by source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationBreakdown {
    /// Points from completed courses.
    pub course_completion: u64,
    /// Points from earned DataCoins.
    pub data_coins: u64,
    /// Points from stakes and SBT mints.
    pub contributions: u64,
}

impl ReputationBreakdown {
    /// Sum of all sources.
    pub fn total(&self) -> u64 {
        self.course_completion + self.data_coins + self.contributions
    }
}

/// A single reputation increase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationGain {
    /// Source transaction.
    pub hash: String,
    /// Source transaction kind.
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Points gained.
    pub points: u64,
    /// Human readable source.
    pub reason: String,
    /// Transaction timestamp.
    pub timestamp: i64,
}

/// Reputation summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationStats {
    /// Total points.
    pub total: u64,
    /// Points by source.
    pub breakdown: ReputationBreakdown,
    /// Most recent gains, newest first.
    pub recent_gains: Vec<ReputationGain>,
    /// Newest gain.
    pub last_gain: Option<ReputationGain>,
}

fn reputation_points(tx: &TransactionRecord) -> Option<(u64, &'static str)> {
    match tx.kind {
        TransactionKind::Complete => Some((REPUTATION_COURSE_COMPLETION, "Course completed")),
        TransactionKind::Datacoin => {
            let points = (tx.amount_f64() * REPUTATION_PER_DATACOIN).floor();
            (points >= 1.0).then_some((points as u64, "DataCoins earned"))
        }
        TransactionKind::Mint => Some((REPUTATION_SBT_MINT, "SBT minted")),
        TransactionKind::Stake => Some((REPUTATION_STAKE, "Course staked")),
        TransactionKind::Refund => None,
    }
}

fn successful_newest_first(txs: &[TransactionRecord]) -> Vec<TransactionRecord> {
    let mut sorted: Vec<_> = txs
        .iter()
        .filter(|tx| tx.status != TransactionStatus::Failed)
        .cloned()
        .collect();
    sort_newest_first(&mut sorted);
    sorted
}

/// Compute reputation from a transaction log. Failed entries are ignored.
pub fn reputation(txs: &[TransactionRecord]) -> ReputationStats {
    let mut breakdown = ReputationBreakdown::default();
    let mut gains = Vec::new();

    for tx in successful_newest_first(txs) {
        let Some((points, reason)) = reputation_points(&tx) else {
            continue;
        };
        match tx.kind {
            TransactionKind::Complete => breakdown.course_completion += points,
            TransactionKind::Datacoin => breakdown.data_coins += points,
            _ => breakdown.contributions += points,
        }
        gains.push(ReputationGain {
            hash: tx.hash.clone(),
            kind: tx.kind,
            points,
            reason: reason.to_string(),
            timestamp: tx.timestamp,
        });
    }

    let last_gain = gains.first().cloned();
    gains.truncate(RECENT_GAINS_LIMIT);

    ReputationStats {
        total: breakdown.total(),
        breakdown,
        recent_gains: gains,
        last_gain,
    }
}

/// A soulbound token derived from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtEntry {
    /// Source transaction.
    pub hash: String,
    /// Mint reason.
    pub reason: String,
    /// Course id.
    pub course_id: String,
    /// Certificate CID when the token certifies a course.
    #[serde(rename = "certificateCID", skip_serializing_if = "Option::is_none")]
    pub certificate_cid: Option<String>,
    /// Mint timestamp.
    pub timestamp: i64,
}

/// SBT summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SbtStats {
    /// Number of SBTs.
    pub total: usize,
    /// Most recent SBTs, newest first.
    pub recent: Vec<SbtEntry>,
    /// Newest SBT.
    pub last_minted: Option<SbtEntry>,
}

fn is_sbt(tx: &TransactionRecord) -> bool {
    match tx.kind {
        TransactionKind::Mint => true,
        TransactionKind::Complete if tx.certificate_cid.is_some() => true,
        _ => tx
            .reason
            .as_deref()
            .is_some_and(|r| r.contains("SBT") || r.contains("Soulbound")),
    }
}

/// Count soulbound tokens in a transaction log.
pub fn sbt_stats(txs: &[TransactionRecord]) -> SbtStats {
    let mut entries: Vec<SbtEntry> = successful_newest_first(txs)
        .into_iter()
        .filter(is_sbt)
        .map(|tx| SbtEntry {
            hash: tx.hash,
            reason: tx.reason.unwrap_or_else(|| "SBT Minted".to_string()),
            course_id: tx.course_id,
            certificate_cid: tx.certificate_cid,
            timestamp: tx.timestamp,
        })
        .collect();

    let total = entries.len();
    let last_minted = entries.first().cloned();
    entries.truncate(RECENT_SBT_LIMIT);

    SbtStats {
        total,
        recent: entries,
        last_minted,
    }
}

/// Activity feed category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// Token minted.
    Mint,
    /// Stake or verification.
    Verify,
    /// Reputation change.
    Reputation,
}

impl From<TransactionKind> for ActivityKind {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Mint | TransactionKind::Complete => ActivityKind::Mint,
            TransactionKind::Stake => ActivityKind::Verify,
            TransactionKind::Refund | TransactionKind::Datacoin => ActivityKind::Reputation,
        }
    }
}

/// One line of the activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    /// Source transaction.
    pub id: String,
    /// Category.
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Human description.
    pub description: String,
    /// Transaction timestamp.
    pub timestamp: i64,
    /// Relative time at render.
    pub time_ago: String,
    /// Settlement status.
    pub status: TransactionStatus,
}

/// Describe a transaction for the activity feed.
pub fn describe(tx: &TransactionRecord) -> String {
    match tx.kind {
        TransactionKind::Stake => {
            format!("Staked {} ETH for course {}", tx.amount, tx.course_id)
        }
        TransactionKind::Complete => format!("Completed course {}", tx.course_id),
        TransactionKind::Refund => format!(
            "Received {} ETH refund for course {}",
            tx.amount, tx.course_id
        ),
        TransactionKind::Datacoin => format!(
            "Earned {} DataCoins for {}",
            tx.amount,
            tx.reason.as_deref().unwrap_or("activity")
        ),
        TransactionKind::Mint => format!(
            "Minted SBT for {}",
            tx.reason.as_deref().unwrap_or("contribution")
        ),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// Render `timestamp` relative to `now` (both unix seconds).
pub fn relative_time(timestamp: i64, now: i64) -> String {
    let diff = now.saturating_sub(timestamp).max(0);
    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if minutes < 1 {
        "Just now".to_string()
    } else if hours < 1 {
        plural(minutes, "minute")
    } else if days < 1 {
        plural(hours, "hour")
    } else if days < 7 {
        plural(days, "day")
    } else {
        Utc.timestamp_opt(timestamp, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }
}

/// Build the activity feed: newest entries first.
pub fn recent_activity(txs: &[TransactionRecord], now: i64) -> Vec<ActivityItem> {
    let mut sorted = txs.to_vec();
    sort_newest_first(&mut sorted);
    sorted
        .iter()
        .take(ACTIVITY_FEED_LIMIT)
        .map(|tx| ActivityItem {
            id: tx.hash.clone(),
            kind: tx.kind.into(),
            description: describe(tx),
            timestamp: tx.timestamp,
            time_ago: relative_time(tx.timestamp, now),
            status: tx.status,
        })
        .collect()
}

/// Dashboard bundle of every derived statistic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// Reputation summary.
    pub reputation: ReputationStats,
    /// SBT summary.
    pub sbts: SbtStats,
    /// Activity feed.
    pub activity: Vec<ActivityItem>,
    /// Number of transactions considered.
    pub transaction_count: usize,
}

/// Compute every derived statistic in one pass over the log.
pub fn user_stats(txs: &[TransactionRecord], now: i64) -> UserStats {
    UserStats {
        reputation: reputation(txs),
        sbts: sbt_stats(txs),
        activity: recent_activity(txs, now),
        transaction_count: txs.len(),
    }
}

/// Leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based rank.
    pub rank: usize,
    /// Wallet.
    pub address: Address,
    /// Total reputation.
    pub reputation: u64,
    /// Points by source.
    pub breakdown: ReputationBreakdown,
    /// SBT count.
    pub sbt_count: usize,
}

/// Rank users by reputation, highest first. Ties are ordered by address.
pub fn leaderboard(
    users: impl IntoIterator<Item = (Address, Vec<TransactionRecord>)>,
    limit: usize,
) -> Vec<LeaderboardEntry> {
    let mut rows: Vec<_> = users
        .into_iter()
        .map(|(address, txs)| {
            let rep = reputation(&txs);
            (address, rep.breakdown, sbt_stats(&txs).total)
        })
        .collect();

    rows.sort_by(|a, b| b.1.total().cmp(&a.1.total()).then_with(|| a.0.cmp(&b.0)));

    rows.into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (address, breakdown, sbt_count))| LeaderboardEntry {
            rank: i + 1,
            address,
            reputation: breakdown.total(),
            breakdown,
            sbt_count,
        })
        .collect()
}
