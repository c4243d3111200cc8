//! Reads of the on-chain Reputation contract.

use alloy::primitives::{Address, U256};
use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::sol;
use alloy::transports::http::{Client, Http};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract Reputation {
        function getScore(address user) external view returns (uint256);
        function topContributors(uint256 limit) external view returns (address[] addrs, uint256[] scores);
    }
}

/// Reputation of one contributor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationScore {
    /// Contributor wallet.
    pub address: Address,
    /// Accumulated reputation.
    pub score: U256,
}

/// Source of contributor reputation.
#[async_trait]
pub trait ReputationSource: Send + Sync {
    /// Highest scores first, at most `limit`.
    async fn top_contributors(&self, limit: u64) -> Result<Vec<ReputationScore>>;

    /// Score of `user`, zero when unknown.
    async fn score(&self, user: Address) -> Result<U256>;
}

/// Reads a deployed Reputation contract over HTTP RPC.
pub struct ReputationContract {
    contract: Reputation::ReputationInstance<Http<Client>, RootProvider<Http<Client>>>,
}

impl ReputationContract {
    /// Read the contract at `address`.
    pub fn new(rpc_url: &str, address: Address) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?,
        );
        Ok(Self {
            contract: Reputation::new(address, provider),
        })
    }
}

#[async_trait]
impl ReputationSource for ReputationContract {
    async fn top_contributors(&self, limit: u64) -> Result<Vec<ReputationScore>> {
        let result = self
            .contract
            .topContributors(U256::from(limit))
            .call()
            .await
            .context("Failed to read top contributors")?;
        pair_scores(result.addrs, result.scores)
    }

    async fn score(&self, user: Address) -> Result<U256> {
        let result = self
            .contract
            .getScore(user)
            .call()
            .await
            .with_context(|| format!("Failed to read reputation of {}", user))?;
        Ok(result._0)
    }
}

fn pair_scores(addrs: Vec<Address>, scores: Vec<U256>) -> Result<Vec<ReputationScore>> {
    if addrs.len() != scores.len() {
        bail!(
            "Reputation contract returned {} addresses but {} scores",
            addrs.len(),
            scores.len()
        );
    }
    Ok(addrs
        .into_iter()
        .zip(scores)
        .map(|(address, score)| ReputationScore { address, score })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_scores() {
        let paired = pair_scores(
            vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            vec![U256::from(30), U256::from(10)],
        )
        .unwrap();
        assert_eq!(paired[1].address, Address::repeat_byte(2));
        assert_eq!(paired[0].score, U256::from(30));

        assert!(pair_scores(vec![Address::ZERO], vec![]).is_err());
    }

    #[test]
    fn test_invalid_rpc_url() {
        assert!(ReputationContract::new("not a url", Address::ZERO).is_err());
    }
}
