//! DataCoin reward minting.
//!
//! [`DataCoinMinter`] sends `mint` transactions with a bumped legacy gas
//! price and retries with linear backoff. [`OfflineMinter`] is used when no
//! contract or minter key is configured and returns synthetic hashes.

use alloy::network::EthereumWallet;
use alloy::primitives::{keccak256, Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RewardsConfig;

// Alloy provider with the recommended fillers and a local wallet
type WalletProvider = alloy::providers::fillers::FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::fillers::JoinFill<
            alloy::providers::Identity,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::GasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::BlobGasFiller,
                    alloy::providers::fillers::JoinFill<
                        alloy::providers::fillers::NonceFiller,
                        alloy::providers::fillers::ChainIdFiller,
                    >,
                >,
            >,
        >,
        alloy::providers::fillers::WalletFiller<EthereumWallet>,
    >,
    alloy::providers::RootProvider<alloy::transports::http::Http<alloy::transports::http::Client>>,
    alloy::transports::http::Http<alloy::transports::http::Client>,
    alloy::network::Ethereum,
>;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract DataCoin {
        function mint(address to, uint256 amount, string reason) external;
        function balanceOf(address account) external view returns (uint256);
    }
}

/// Outcome of a mint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    /// Transaction hash (synthetic in offline mode).
    pub tx_hash: String,
    /// Token contract, zero in offline mode.
    pub token_address: Address,
    /// Whether no transaction was sent.
    pub simulated: bool,
}

/// Mints DataCoin rewards.
#[async_trait]
pub trait RewardMinter: Send + Sync {
    /// Mint `amount` token base units to `to`.
    async fn mint(&self, to: Address, amount: U256, reason: &str) -> Result<MintReceipt>;
}

/// Retry and gas policy for mint transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintPolicy {
    /// Gas limit per transaction.
    pub gas_limit: u64,
    /// Percentage added to the network gas price.
    pub gas_price_bump_percent: u64,
    /// Extra percentage per retry.
    pub retry_bump_percent: u64,
    /// Maximum attempts.
    pub max_attempts: u32,
    /// Backoff unit, multiplied by the attempt number.
    pub retry_backoff: Duration,
}

impl Default for MintPolicy {
    fn default() -> Self {
        Self::from(&RewardsConfig::default())
    }
}

impl From<&RewardsConfig> for MintPolicy {
    fn from(config: &RewardsConfig) -> Self {
        Self {
            gas_limit: config.gas_limit,
            gas_price_bump_percent: config.gas_price_bump_percent,
            retry_bump_percent: config.retry_bump_percent,
            max_attempts: config.max_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

impl MintPolicy {
    /// Gas price for a 0-based retry index.
    pub fn gas_price(&self, network_price: u128, retry: u32) -> u128 {
        let percent =
            100 + self.gas_price_bump_percent as u128 + self.retry_bump_percent as u128 * retry as u128;
        network_price.saturating_mul(percent) / 100
    }

    /// Delay after the given 1-based failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff * attempt
    }
}

/// On-chain DataCoin minter.
pub struct DataCoinMinter {
    contract: DataCoin::DataCoinInstance<
        alloy::transports::http::Http<alloy::transports::http::Client>,
        WalletProvider,
    >,
    provider: WalletProvider,
    address: Address,
    policy: MintPolicy,
}

impl DataCoinMinter {
    /// Create a minter signing with `signer`.
    pub fn new(
        rpc_url: &str,
        contract_address: Address,
        signer: PrivateKeySigner,
        policy: MintPolicy,
    ) -> Result<Self> {
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(
                rpc_url
                    .parse()
                    .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?,
            );

        let contract = DataCoin::new(contract_address, provider.clone());

        Ok(Self {
            contract,
            provider,
            address: contract_address,
            policy,
        })
    }

    async fn try_mint(&self, to: Address, amount: U256, reason: &str, retry: u32) -> Result<String> {
        let network_price = self
            .provider
            .get_gas_price()
            .await
            .context("Failed to fetch gas price")?;
        let gas_price = self.policy.gas_price(network_price, retry);

        let pending = self
            .contract
            .mint(to, amount, reason.to_string())
            .gas(self.policy.gas_limit)
            .gas_price(gas_price)
            .send()
            .await
            .context("Failed to send mint transaction")?;

        info!(
            "Mint transaction sent (attempt {}): {}",
            retry + 1,
            pending.tx_hash()
        );

        let receipt = pending
            .get_receipt()
            .await
            .context("Failed to get mint receipt")?;

        if !receipt.status() {
            anyhow::bail!(
                "Mint transaction reverted: {} in block {}",
                receipt.transaction_hash,
                receipt.block_number.unwrap_or_default()
            );
        }

        Ok(receipt.transaction_hash.to_string())
    }
}

#[async_trait]
impl RewardMinter for DataCoinMinter {
    async fn mint(&self, to: Address, amount: U256, reason: &str) -> Result<MintReceipt> {
        let mut attempt = 0;
        loop {
            match self.try_mint(to, amount, reason, attempt).await {
                Ok(tx_hash) => {
                    info!(to = %to, %amount, reason, tx_hash, "DataCoin minted");
                    return Ok(MintReceipt {
                        tx_hash,
                        token_address: self.address,
                        simulated: false,
                    });
                }
                Err(e) => {
                    attempt += 1;
                    warn!("Mint attempt {} failed: {:#}", attempt, e);
                    if attempt >= self.policy.max_attempts {
                        return Err(e.context(format!("Mint failed after {} attempts", attempt)));
                    }
                    tokio::time::sleep(self.policy.backoff(attempt)).await;
                }
            }
        }
    }
}

/// Minter for development without a chain.
#[derive(Debug, Default)]
pub struct OfflineMinter {
    sequence: AtomicU64,
}

impl OfflineMinter {
    /// Create an offline minter.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RewardMinter for OfflineMinter {
    async fn mint(&self, to: Address, amount: U256, reason: &str) -> Result<MintReceipt> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp_millis();

        let mut preimage = Vec::with_capacity(20 + 32 + reason.len() + 16);
        preimage.extend_from_slice(to.as_slice());
        preimage.extend_from_slice(&amount.to_be_bytes::<32>());
        preimage.extend_from_slice(reason.as_bytes());
        preimage.extend_from_slice(&sequence.to_be_bytes());
        preimage.extend_from_slice(&now.to_be_bytes());
        let tx_hash = keccak256(&preimage).to_string();

        info!(to = %to, %amount, reason, tx_hash, "DataCoin contract not configured, simulated mint");

        Ok(MintReceipt {
            tx_hash,
            token_address: Address::ZERO,
            simulated: true,
        })
    }
}
