//! DataCoin reward rules.
//!
//! Rewards are expressed in whole DataCoins and converted to base units
//! (18 decimals) only when minting.

use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{DATACOINS_PER_MODULE, TOKEN_DECIMALS};
use crate::error::CoreError;
use crate::types::CourseDifficulty;

/// Activity that earns a DataCoin reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    /// Daily learning streak.
    DailyStreak,
    /// Module completed within a course.
    CourseProgress,
    /// Learning milestone reached.
    Milestone,
    /// Seven-day streak.
    WeeklyStreak,
    /// Thirty-day streak.
    MonthlyStreak,
    /// Generic GitHub contribution.
    GithubContribution,
    /// Ride data shared.
    UberRideData,
    /// Purchase data shared.
    AmazonPurchaseData,
    /// Consumer data verified.
    ConsumerDataVerified,
    /// Repository submitted for review.
    RepositorySubmission,
    /// Commit verified by a reviewer.
    CommitVerification,
    /// Repository approved by a reviewer.
    RepositoryApproval,
}

impl RewardType {
    /// All reward types in table order.
    pub const ALL: [RewardType; 12] = [
        RewardType::DailyStreak,
        RewardType::CourseProgress,
        RewardType::Milestone,
        RewardType::WeeklyStreak,
        RewardType::MonthlyStreak,
        RewardType::GithubContribution,
        RewardType::UberRideData,
        RewardType::AmazonPurchaseData,
        RewardType::ConsumerDataVerified,
        RewardType::RepositorySubmission,
        RewardType::CommitVerification,
        RewardType::RepositoryApproval,
    ];

    /// Reward in whole DataCoins.
    pub const fn amount(&self) -> u64 {
        match self {
            RewardType::DailyStreak => 5,
            RewardType::CourseProgress => 3,
            RewardType::Milestone => 8,
            RewardType::WeeklyStreak => 15,
            RewardType::MonthlyStreak => 50,
            RewardType::GithubContribution => 10,
            RewardType::UberRideData => 5,
            RewardType::AmazonPurchaseData => 5,
            RewardType::ConsumerDataVerified => 20,
            RewardType::RepositorySubmission => 10,
            RewardType::CommitVerification => 5,
            RewardType::RepositoryApproval => 50,
        }
    }

    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RewardType::DailyStreak => "daily_streak",
            RewardType::CourseProgress => "course_progress",
            RewardType::Milestone => "milestone",
            RewardType::WeeklyStreak => "weekly_streak",
            RewardType::MonthlyStreak => "monthly_streak",
            RewardType::GithubContribution => "github_contribution",
            RewardType::UberRideData => "uber_ride_data",
            RewardType::AmazonPurchaseData => "amazon_purchase_data",
            RewardType::ConsumerDataVerified => "consumer_data_verified",
            RewardType::RepositorySubmission => "repository_submission",
            RewardType::CommitVerification => "commit_verification",
            RewardType::RepositoryApproval => "repository_approval",
        }
    }
}

impl fmt::Display for RewardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RewardType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RewardType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| CoreError::UnknownRewardType(s.to_string()))
    }
}

impl CourseDifficulty {
    /// DataCoins granted for completing a course of this difficulty.
    pub const fn completion_reward(&self) -> u64 {
        match self {
            CourseDifficulty::Beginner => 10,
            CourseDifficulty::Intermediate => 25,
            CourseDifficulty::Advanced => 50,
        }
    }
}

/// DataCoins allocated with a course certificate.
pub const fn certificate_allocation(module_count: usize) -> u64 {
    DATACOINS_PER_MODULE * module_count as u64
}

/// Convert whole tokens to base units.
pub fn to_base_units(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(TOKEN_DECIMALS))
}

/// Parse a decimal token amount (e.g. `"0.0001"`) into base units.
pub fn parse_token_amount(amount: &str) -> Result<U256, CoreError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(CoreError::InvalidAmount(amount.to_string()));
    }
    parse_units(trimmed, TOKEN_DECIMALS)
        .map(Into::into)
        .map_err(|_| CoreError::InvalidAmount(amount.to_string()))
}

/// Format base units as a decimal string the way wallets display it.
///
/// Trailing zeros are trimmed but at least one fractional digit is kept,
/// so one token renders as `"1.0"`.
pub fn format_token_amount(value: U256) -> String {
    let full = match format_units(value, TOKEN_DECIMALS) {
        Ok(s) => s,
        Err(_) => return value.to_string(),
    };
    match full.split_once('.') {
        Some((int, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{}.0", int)
            } else {
                format!("{}.{}", int, frac)
            }
        }
        None => format!("{}.0", full),
    }
}
