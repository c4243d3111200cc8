//! RPC provider wrapper for Ethereum communication.

use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockNumberOrTag, BlockTransactionsKind, Filter, Log};
use alloy::transports::http::{Client, Http};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::events::{ChainEvent, EVENT_SIGNATURES};
use poc_core::TransactionRecord;

/// Header fields the sync engine needs from a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block hash
    pub hash: B256,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

/// HTTP RPC provider for querying Ethereum.
#[derive(Clone)]
pub struct RpcProvider {
    provider: RootProvider<Http<Client>>,
    staking_manager: Address,
    data_coin: Address,
}

impl RpcProvider {
    /// Create a new RPC provider watching the staking and DataCoin contracts.
    pub fn new(rpc_url: &str, staking_manager: Address, data_coin: Address) -> Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;

        let provider = ProviderBuilder::new().on_http(url);

        Ok(Self {
            provider,
            staking_manager,
            data_coin,
        })
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("Failed to get block number")
    }

    /// Get chain ID reported by the node.
    pub async fn get_chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .context("Failed to get chain id")
    }

    /// Hash and timestamp of a block, `None` if the node does not know it.
    pub async fn get_block_info(&self, block_number: u64) -> Result<Option<BlockInfo>> {
        let block = self
            .provider
            .get_block_by_number(
                BlockNumberOrTag::Number(block_number),
                BlockTransactionsKind::Hashes,
            )
            .await
            .with_context(|| format!("Failed to fetch block {}", block_number))?;

        Ok(block.map(|block| BlockInfo {
            hash: block.header.hash,
            timestamp: block.header.timestamp,
        }))
    }

    /// Get staking and DataCoin events for a block range.
    ///
    /// With `user` set only events whose first indexed argument is that
    /// address are returned. Events are ordered by block and log index.
    pub async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        user: Option<Address>,
    ) -> Result<Vec<ChainEvent>> {
        let mut filter = Filter::new()
            .address(vec![self.staking_manager, self.data_coin])
            .event_signature(EVENT_SIGNATURES.to_vec())
            .from_block(from_block)
            .to_block(to_block);
        if let Some(user) = user {
            filter = filter.topic1(user.into_word());
        }

        let logs: Vec<Log> = self
            .provider
            .get_logs(&filter)
            .await
            .context("Failed to fetch logs from RPC")?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match ChainEvent::from_log(log) {
                Ok(event) => events.push(event),
                Err(e) => {
                    // Keep processing the rest of the range
                    warn!("Failed to parse event log: {}", e);
                }
            }
        }
        events.sort_by_key(|e| (e.block_number, e.log_index));

        Ok(events)
    }

    /// Convert events to transactions stamped with their block time.
    ///
    /// Falls back to the current time when a block header is unavailable.
    pub async fn to_transactions(&self, events: &[ChainEvent]) -> Vec<(Address, TransactionRecord)> {
        let mut timestamps: HashMap<u64, i64> = HashMap::new();
        let mut records = Vec::with_capacity(events.len());

        for event in events {
            let timestamp = match timestamps.get(&event.block_number) {
                Some(ts) => *ts,
                None => {
                    let ts = match self.get_block_info(event.block_number).await {
                        Ok(Some(info)) => info.timestamp as i64,
                        Ok(None) => chrono::Utc::now().timestamp(),
                        Err(e) => {
                            debug!("Using current time for block {}: {}", event.block_number, e);
                            chrono::Utc::now().timestamp()
                        }
                    };
                    timestamps.insert(event.block_number, ts);
                    ts
                }
            };
            records.push((event.user, event.to_transaction(timestamp)));
        }

        records
    }
}

/// On-demand source of a single user's on-chain history.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Transactions of `user` found in the most recent `lookback_blocks` blocks.
    async fn user_history(
        &self,
        user: Address,
        lookback_blocks: u64,
    ) -> Result<Vec<TransactionRecord>>;
}

#[async_trait]
impl HistorySource for RpcProvider {
    async fn user_history(
        &self,
        user: Address,
        lookback_blocks: u64,
    ) -> Result<Vec<TransactionRecord>> {
        let current = self.get_block_number().await?;
        let from = current.saturating_sub(lookback_blocks);

        let events = self.get_logs(from, current, Some(user)).await?;
        Ok(self
            .to_transactions(&events)
            .await
            .into_iter()
            .map(|(_, tx)| tx)
            .collect())
    }
}
