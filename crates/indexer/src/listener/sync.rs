//! Sync engine for historical and live block processing.

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use super::provider::HistorySource;
use super::RpcProvider;
use crate::config::SyncConfig;
use crate::storage::{Storage, TransactionSource};

/// Sync engine manages historical catch-up and live block synchronization.
pub struct SyncEngine {
    provider: RpcProvider,
    storage: Storage,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(provider: RpcProvider, storage: Storage, config: SyncConfig) -> Self {
        Self {
            provider,
            storage,
            config,
        }
    }

    /// Run the sync loop (historical + live).
    ///
    /// This method runs indefinitely, processing historical blocks in batches
    /// until caught up, then switching to live polling mode.
    pub async fn run(&self) -> Result<()> {
        info!("Sync engine starting...");

        loop {
            let sync_state = self.storage.get_sync_state().await?;
            let current_block = self.provider.get_block_number().await?;
            let safe_block = current_block.saturating_sub(self.config.confirmations);
            let last_synced = sync_state.last_block_number;

            info!(
                "Sync status: last={}, current={}, safe={}, confirmations={}",
                last_synced, current_block, safe_block, self.config.confirmations
            );

            let blocks_behind = safe_block.saturating_sub(last_synced);

            if blocks_behind == 0 {
                info!(
                    "Caught up, waiting {} seconds for new blocks...",
                    self.config.poll_interval_secs
                );
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
                continue;
            }

            if blocks_behind > self.config.batch_size {
                self.sync_historical_batch(last_synced, safe_block).await?;
            } else {
                self.sync_live(last_synced, safe_block).await?;
                tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
            }
        }
    }

    /// Sync a batch of historical blocks.
    async fn sync_historical_batch(&self, from: u64, to: u64) -> Result<()> {
        let batch_end = (from + self.config.batch_size).min(to);

        info!(
            "Historical sync: processing blocks {} to {} ({} blocks)",
            from + 1,
            batch_end,
            batch_end - from
        );

        let stored = self.ingest_range(from + 1, batch_end).await.with_context(|| {
            format!(
                "Failed to ingest blocks {} to {}",
                from + 1,
                batch_end
            )
        })?;

        info!("Batch complete: {} new transactions", stored);

        self.checkpoint(batch_end).await
    }

    /// Sync live blocks (block by block for precise progress).
    async fn sync_live(&self, from: u64, to: u64) -> Result<()> {
        if from >= to {
            return Ok(());
        }

        info!("Live sync: processing blocks {} to {}", from + 1, to);

        for block_num in (from + 1)..=to {
            let stored = self
                .ingest_range(block_num, block_num)
                .await
                .with_context(|| format!("Failed to ingest block {}", block_num))?;

            if stored > 0 {
                info!("Block {}: stored {} transactions", block_num, stored);
            }

            self.checkpoint(block_num).await?;
        }

        Ok(())
    }

    /// Fetch, convert and store every event in the range. Returns the number
    /// of newly stored transactions.
    async fn ingest_range(&self, from: u64, to: u64) -> Result<usize> {
        let events = self.provider.get_logs(from, to, None).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let mut stored = 0;
        for (user, tx) in self.provider.to_transactions(&events).await {
            match self
                .storage
                .insert_transaction(&user, &tx, TransactionSource::Chain)
                .await
            {
                Ok(true) => stored += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to store transaction {}: {}", tx.hash, e),
            }
        }

        Ok(stored)
    }

    async fn checkpoint(&self, block_number: u64) -> Result<()> {
        let block_hash = match self.provider.get_block_info(block_number).await {
            Ok(Some(info)) => info.hash,
            Ok(None) => B256::ZERO,
            Err(e) => {
                warn!("Failed to fetch hash of block {}: {}", block_number, e);
                B256::ZERO
            }
        };

        self.storage
            .advance_sync_state(block_number, block_hash)
            .await
    }
}

/// Fetch the recent on-chain history of one user and store it.
///
/// Returns the number of newly stored transactions.
pub async fn backfill_user(
    source: &dyn HistorySource,
    storage: &Storage,
    user: Address,
    lookback_blocks: u64,
) -> Result<usize> {
    let txs = source.user_history(user, lookback_blocks).await?;

    let mut stored = 0;
    for tx in &txs {
        if storage
            .insert_transaction(&user, tx, TransactionSource::Chain)
            .await?
        {
            stored += 1;
        }
    }

    info!(
        user = %user,
        found = txs.len(),
        stored,
        "Backfilled on-chain history"
    );

    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::setup_storage;
    use async_trait::async_trait;
    use poc_core::{TransactionKind, TransactionRecord, TransactionStatus};

    struct FixedHistory(Vec<TransactionRecord>);

    #[async_trait]
    impl HistorySource for FixedHistory {
        async fn user_history(
            &self,
            _user: Address,
            _lookback_blocks: u64,
        ) -> Result<Vec<TransactionRecord>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_backfill_user_is_idempotent() {
        let (storage, _temp_db) = setup_storage().await;
        let user = Address::repeat_byte(0x11);

        let source = FixedHistory(vec![TransactionRecord {
            hash: "0xabc".to_string(),
            kind: TransactionKind::Stake,
            amount: "0.01".to_string(),
            course_id: "1".to_string(),
            timestamp: 1_700_000_000,
            status: TransactionStatus::Success,
            block_number: Some(5),
            certificate_cid: None,
            reason: None,
        }]);

        assert_eq!(backfill_user(&source, &storage, user, 100).await.unwrap(), 1);
        assert_eq!(backfill_user(&source, &storage, user, 100).await.unwrap(), 0);
        assert_eq!(storage.list_transactions(&user).await.unwrap().len(), 1);
    }
}
