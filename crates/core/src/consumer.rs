//! Verified consumer data contributions.
//!
//! A learner proves facts about an external account (GitHub activity, ride
//! history, purchase history) with a witness-signed claim and is paid
//! DataCoins by volume. The first accepted contribution of a user carries a
//! one-time bonus.
//!
//! Claims follow the witness protocol: the claim identifier is
//! `keccak256(provider \n parameters \n context)` and each witness signs
//! `owner \n identifier \n timestampS \n epoch` as an EIP-191 message.

use alloy_primitives::{keccak256, Address, PrimitiveSignature, B256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::rewards::RewardType;

/// Cap on the GitHub contribution payout.
pub const GITHUB_REWARD_CAP: u64 = 100;

/// Months of history paid for at most.
pub const MAX_MONTHS: f64 = 12.0;

/// Rides assumed per month of Uber history.
pub const RIDES_PER_MONTH: f64 = 10.0;

/// Orders assumed per month of Amazon history.
pub const ORDERS_PER_MONTH: f64 = 5.0;

/// Where a contribution's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// GitHub account activity.
    Github,
    /// Uber ride history.
    Uber,
    /// Amazon purchase history.
    Amazon,
}

impl DataSource {
    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataSource::Github => "github",
            DataSource::Uber => "uber",
            DataSource::Amazon => "amazon",
        }
    }

    /// Reward tag paid for this source.
    pub const fn reward_type(&self) -> RewardType {
        match self {
            DataSource::Github => RewardType::GithubContribution,
            DataSource::Uber => RewardType::UberRideData,
            DataSource::Amazon => RewardType::AmazonPurchaseData,
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(DataSource::Github),
            "uber" => Ok(DataSource::Uber),
            "amazon" => Ok(DataSource::Amazon),
            other => Err(CoreError::UnknownDataSource(other.to_string())),
        }
    }
}

/// Figures extracted from a verified claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConsumerData {
    /// GitHub activity.
    #[serde(rename_all = "camelCase")]
    Github {
        /// Commits authored.
        commits: u64,
        /// Pull requests opened.
        pull_requests: u64,
        /// Issues opened.
        issues: u64,
        /// Repositories owned.
        repositories: u64,
        /// Longest daily streak.
        contribution_streak: u64,
    },
    /// Ride history.
    #[serde(rename_all = "camelCase")]
    Uber {
        /// Rides taken.
        rides: u64,
        /// Distance travelled.
        total_distance: f64,
        /// Amount spent.
        total_spent: f64,
    },
    /// Purchase history.
    #[serde(rename_all = "camelCase")]
    Amazon {
        /// Orders placed.
        orders: u64,
        /// Product categories.
        categories: Vec<String>,
        /// Amount spent.
        total_spent: f64,
    },
}

/// Numeric field that may arrive as a JSON number or a decimal string.
fn number(params: &Map<String, Value>, key: &str) -> f64 {
    match params.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
    .max(0.0)
}

fn count(params: &Map<String, Value>, key: &str) -> u64 {
    number(params, key).floor() as u64
}

fn strings(params: &Map<String, Value>, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

impl ConsumerData {
    /// Read the figures of `source` from extracted claim parameters.
    /// Missing or malformed figures count as zero.
    pub fn extract(source: DataSource, params: &Map<String, Value>) -> Self {
        match source {
            DataSource::Github => ConsumerData::Github {
                commits: count(params, "commits"),
                pull_requests: count(params, "pullRequests"),
                issues: count(params, "issues"),
                repositories: count(params, "repositories"),
                contribution_streak: count(params, "contributionStreak"),
            },
            DataSource::Uber => ConsumerData::Uber {
                rides: count(params, "rides"),
                total_distance: number(params, "totalDistance"),
                total_spent: number(params, "totalSpent"),
            },
            DataSource::Amazon => ConsumerData::Amazon {
                orders: count(params, "orders"),
                categories: strings(params, "categories"),
                total_spent: number(params, "totalSpent"),
            },
        }
    }

    /// DataCoins paid for this data, before any first-contribution bonus.
    ///
    /// GitHub pays 10 per contribution (commits, pull requests and issues)
    /// up to 100. Uber and Amazon pay 5 per month of history, estimated from
    /// volume and capped at a year.
    pub fn data_coins(&self) -> u64 {
        match self {
            ConsumerData::Github {
                commits,
                pull_requests,
                issues,
                ..
            } => {
                let contributions = commits + pull_requests + issues;
                contributions
                    .saturating_mul(RewardType::GithubContribution.amount())
                    .min(GITHUB_REWARD_CAP)
            }
            ConsumerData::Uber { rides, .. } => monthly_reward(
                *rides as f64 / RIDES_PER_MONTH,
                RewardType::UberRideData.amount(),
            ),
            ConsumerData::Amazon { orders, .. } => monthly_reward(
                *orders as f64 / ORDERS_PER_MONTH,
                RewardType::AmazonPurchaseData.amount(),
            ),
        }
    }
}

fn monthly_reward(months: f64, per_month: u64) -> u64 {
    (months.min(MAX_MONTHS) * per_month as f64).floor() as u64
}

/// Total payout of a contribution.
pub fn contribution_reward(data: &ConsumerData, first_contribution: bool) -> u64 {
    let bonus = if first_contribution {
        RewardType::ConsumerDataVerified.amount()
    } else {
        0
    };
    data.data_coins() + bonus
}

/// The attested part of a witness claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimData {
    /// Provider the data came from (`http` for generic providers).
    pub provider: String,
    /// Provider request parameters, JSON text.
    pub parameters: String,
    /// Claim context, JSON text holding `extractedParameters`.
    #[serde(default)]
    pub context: String,
    /// Address that requested the claim.
    pub owner: String,
    /// Claim time in unix seconds.
    pub timestamp_s: u64,
    /// Witness epoch.
    pub epoch: u64,
    /// Claim identifier, see [`claim_identifier`].
    pub identifier: String,
}

/// Witness registered for a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Witness address.
    pub id: String,
    /// Witness endpoint.
    #[serde(default)]
    pub url: String,
}

/// A claim plus witness signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimProof {
    /// Attested claim.
    pub claim_data: ClaimData,
    /// `0x`-prefixed 65-byte EIP-191 signatures.
    pub signatures: Vec<String>,
    /// Witnesses named by the proof.
    #[serde(default)]
    pub witnesses: Vec<Witness>,
}

/// `keccak256(provider \n parameters \n context)`.
pub fn claim_identifier(provider: &str, parameters: &str, context: &str) -> B256 {
    keccak256(format!("{}\n{}\n{}", provider, parameters, context).as_bytes())
}

impl ClaimData {
    /// Message every witness signs.
    pub fn signed_message(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.owner.to_lowercase(),
            self.identifier.to_lowercase(),
            self.timestamp_s,
            self.epoch
        )
    }

    /// Whether `identifier` matches the claimed content.
    pub fn identifier_matches(&self) -> bool {
        let expected = claim_identifier(&self.provider, &self.parameters, &self.context);
        self.identifier.to_lowercase() == format!("{:#x}", expected)
    }

    /// `extractedParameters` of the context, empty when absent.
    pub fn extracted_parameters(&self) -> Map<String, Value> {
        serde_json::from_str::<Value>(&self.context)
            .ok()
            .and_then(|ctx| match ctx.get("extractedParameters") {
                Some(Value::Object(params)) => Some(params.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl ClaimProof {
    /// Addresses recovered from the witness signatures.
    pub fn signers(&self) -> Result<Vec<Address>, CoreError> {
        let message = self.claim_data.signed_message();
        self.signatures
            .iter()
            .map(|signature| {
                let raw = hex::decode(signature.trim_start_matches("0x"))
                    .map_err(|_| CoreError::InvalidHex)?;
                let sig = PrimitiveSignature::try_from(raw.as_slice())
                    .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;
                sig.recover_address_from_msg(message.as_bytes())
                    .map_err(|e| CoreError::InvalidSignature(e.to_string()))
            })
            .collect()
    }
}
