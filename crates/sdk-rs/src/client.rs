//! Cached, debounced transaction client.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use poc_core::{
    sort_newest_first,
    stats::{recent_activity, sbt_stats, user_stats, ActivityItem, SbtStats, UserStats},
    Address, TransactionRecord,
};
use tokio::{sync::RwLock, task::JoinHandle, time::Instant};
use tracing::{debug, warn};

use crate::error::Result;
use crate::source::{NewTransaction, TransactionSource};

/// Default lifetime of a cached transaction list.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Default quiet period before a scheduled fetch runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Client tuning.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Cached lists older than this are refetched.
    pub cache_ttl: Duration,
    /// Delay applied by [`TransactionsClient::schedule_fetch`].
    pub debounce: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    address: Address,
    transactions: Vec<TransactionRecord>,
    fetched_at: Instant,
    ticket: u64,
}

/// Transaction log of the connected wallet, cached per address.
///
/// Cloning is cheap and clones share the cache. A fetch only stores its
/// result if no newer fetch has stored one and [`clear`](Self::clear) was not
/// called while it was in flight.
pub struct TransactionsClient<S> {
    source: Arc<S>,
    config: ClientConfig,
    cache: Arc<RwLock<Option<CacheEntry>>>,
    generation: Arc<AtomicU64>,
    session: Arc<AtomicU64>,
    tickets: Arc<AtomicU64>,
}

impl<S> Clone for TransactionsClient<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: self.config,
            cache: Arc::clone(&self.cache),
            generation: Arc::clone(&self.generation),
            session: Arc::clone(&self.session),
            tickets: Arc::clone(&self.tickets),
        }
    }
}

impl<S: TransactionSource + 'static> TransactionsClient<S> {
    /// Client with the default TTL and debounce.
    pub fn new(source: S) -> Self {
        Self::with_config(source, ClientConfig::default())
    }

    /// Client with explicit tuning.
    pub fn with_config(source: S, config: ClientConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
            cache: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            session: Arc::new(AtomicU64::new(0)),
            tickets: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Transactions of `address`, newest first.
    ///
    /// Served from cache when the entry belongs to `address` and is younger
    /// than the TTL, unless `force` is set.
    pub async fn fetch(&self, address: Address, force: bool) -> Result<Vec<TransactionRecord>> {
        if !force {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.address == address && entry.fetched_at.elapsed() < self.config.cache_ttl {
                    return Ok(entry.transactions.clone());
                }
            }
        }

        let session = self.session.load(Ordering::SeqCst);
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;

        let mut transactions = self.source.list(address).await?;
        sort_newest_first(&mut transactions);
        debug!(user = %address, count = transactions.len(), force, "Transactions refreshed");

        let mut cache = self.cache.write().await;
        let superseded = cache.as_ref().is_some_and(|entry| entry.ticket > ticket);
        if self.session.load(Ordering::SeqCst) != session || superseded {
            debug!(user = %address, "Stale fetch result not cached");
        } else {
            *cache = Some(CacheEntry {
                address,
                transactions: transactions.clone(),
                fetched_at: Instant::now(),
                ticket,
            });
        }
        Ok(transactions)
    }

    /// Bypass the cache.
    pub async fn refetch(&self, address: Address) -> Result<Vec<TransactionRecord>> {
        self.fetch(address, true).await
    }

    /// Append a transaction, then refresh the cached list.
    pub async fn add_transaction(
        &self,
        address: Address,
        tx: NewTransaction,
    ) -> Result<TransactionRecord> {
        let stored = self.source.add(address, &tx).await?;
        if let Err(e) = self.fetch(address, true).await {
            warn!(user = %address, "Refresh after add failed: {}", e);
        }
        Ok(stored)
    }

    /// Fetch after the debounce period. A later call supersedes a pending
    /// one; superseded tasks resolve to `None` without touching the source.
    pub fn schedule_fetch(
        &self,
        address: Address,
    ) -> JoinHandle<Option<Result<Vec<TransactionRecord>>>> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let client = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(client.config.debounce).await;
            if client.generation.load(Ordering::SeqCst) != ticket {
                return None;
            }
            Some(client.fetch(address, false).await)
        })
    }

    /// Drop the cached list. Pending scheduled fetches are cancelled and
    /// fetches already in flight will not repopulate the cache.
    pub async fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.session.fetch_add(1, Ordering::SeqCst);
        *self.cache.write().await = None;
    }

    /// Cached transactions of `address`, empty when another wallet's list or
    /// nothing is cached.
    pub async fn cached(&self, address: Address) -> Vec<TransactionRecord> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.address == address)
            .map(|entry| entry.transactions.clone())
            .unwrap_or_default()
    }

    /// Dashboard statistics over the cached list of `address`.
    pub async fn stats(&self, address: Address) -> UserStats {
        user_stats(&self.cached(address).await, chrono::Utc::now().timestamp())
    }

    /// Activity feed over the cached list of `address`.
    pub async fn activity(&self, address: Address) -> Vec<ActivityItem> {
        recent_activity(&self.cached(address).await, chrono::Utc::now().timestamp())
    }

    /// SBT summary over the cached list of `address`.
    pub async fn sbt_stats(&self, address: Address) -> SbtStats {
        sbt_stats(&self.cached(address).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use poc_core::{TransactionKind, TransactionStatus};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySource {
        txs: Mutex<Vec<TransactionRecord>>,
        list_calls: AtomicUsize,
        /// Per-wallet latency of `list`.
        delays: Mutex<Vec<(Address, Duration)>>,
    }

    impl MemorySource {
        fn with_delay(self, user: Address, delay: Duration) -> Self {
            self.delays.lock().unwrap().push((user, delay));
            self
        }
    }

    fn record(hash: &str, kind: TransactionKind, timestamp: i64) -> TransactionRecord {
        TransactionRecord {
            hash: hash.to_string(),
            kind,
            amount: "1".to_string(),
            course_id: "1".to_string(),
            timestamp,
            status: TransactionStatus::Success,
            block_number: None,
            certificate_cid: None,
            reason: None,
        }
    }

    #[async_trait]
    impl TransactionSource for MemorySource {
        async fn list(&self, user: Address) -> Result<Vec<TransactionRecord>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self
                .delays
                .lock()
                .unwrap()
                .iter()
                .find(|(u, _)| *u == user)
                .map(|(_, d)| *d);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.txs.lock().unwrap().clone())
        }

        async fn add(&self, _user: Address, tx: &NewTransaction) -> Result<TransactionRecord> {
            let mut txs = self.txs.lock().unwrap();
            let mut stored = record(&format!("0x{:02}", txs.len()), tx.kind, 100 + txs.len() as i64);
            stored.certificate_cid = tx.certificate_cid.clone();
            txs.push(stored.clone());
            Ok(stored)
        }
    }

    impl TransactionsClient<MemorySource> {
        fn list_calls(&self) -> usize {
            self.source.list_calls.load(Ordering::SeqCst)
        }
    }

    fn wallet(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_uses_cache_until_ttl() {
        let client = TransactionsClient::new(MemorySource::default());

        client.fetch(wallet(1), false).await.unwrap();
        client.fetch(wallet(1), false).await.unwrap();
        assert_eq!(client.list_calls(), 1);

        tokio::time::advance(DEFAULT_CACHE_TTL + Duration::from_secs(1)).await;
        client.fetch(wallet(1), false).await.unwrap();
        assert_eq!(client.list_calls(), 2);

        client.fetch(wallet(1), true).await.unwrap();
        assert_eq!(client.list_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_is_keyed_by_address() {
        let client = TransactionsClient::new(MemorySource::default());
        client.fetch(wallet(1), false).await.unwrap();
        client.fetch(wallet(2), false).await.unwrap();
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_transaction_refreshes_cache() {
        let client = TransactionsClient::new(MemorySource::default());
        assert!(client.fetch(wallet(1), false).await.unwrap().is_empty());

        client
            .add_transaction(wallet(1), NewTransaction::new(TransactionKind::Stake))
            .await
            .unwrap();
        let mut completion = NewTransaction::new(TransactionKind::Complete);
        completion.certificate_cid = Some("bafkreiexample".to_string());
        client.add_transaction(wallet(1), completion).await.unwrap();

        let cached = client.cached(wallet(1)).await;
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].kind, TransactionKind::Complete);
        assert_eq!(client.sbt_stats(wallet(1)).await.total, 1);
        assert_eq!(client.activity(wallet(1)).await.len(), 2);
        assert!(client.cached(wallet(2)).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_fetch_is_debounced() {
        let client = TransactionsClient::new(MemorySource::default());

        let first = client.schedule_fetch(wallet(1));
        let second = client.schedule_fetch(wallet(1));
        let third = client.schedule_fetch(wallet(1));

        assert!(first.await.unwrap().is_none());
        assert!(second.await.unwrap().is_none());
        assert!(third.await.unwrap().unwrap().is_ok());
        assert_eq!(client.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_cache_and_pending_fetch() {
        let client = TransactionsClient::new(MemorySource::default());
        client.fetch(wallet(1), false).await.unwrap();

        let pending = client.schedule_fetch(wallet(1));
        client.clear().await;
        assert!(pending.await.unwrap().is_none());
        assert!(client.cached(wallet(1)).await.is_empty());
        assert_eq!(client.stats(wallet(1)).await.transaction_count, 0);

        client.fetch(wallet(1), false).await.unwrap();
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_fetch_keeps_cache_empty() {
        let source = MemorySource::default().with_delay(wallet(1), Duration::from_secs(5));
        source
            .txs
            .lock()
            .unwrap()
            .push(record("0xaa", TransactionKind::Stake, 100));
        let client = TransactionsClient::new(source);

        let in_flight = {
            let client = client.clone();
            tokio::spawn(async move { client.fetch(wallet(1), false).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        client.clear().await;

        // The caller still gets its answer, the cache stays cleared.
        assert_eq!(in_flight.await.unwrap().unwrap().len(), 1);
        assert!(client.cached(wallet(1)).await.is_empty());

        client.fetch(wallet(1), false).await.unwrap();
        assert_eq!(client.cached(wallet(1)).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_does_not_replace_newer_wallet() {
        let source = MemorySource::default().with_delay(wallet(1), Duration::from_secs(5));
        let client = TransactionsClient::new(source);

        let slow = {
            let client = client.clone();
            tokio::spawn(async move { client.fetch(wallet(1), false).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        client.fetch(wallet(2), false).await.unwrap();

        slow.await.unwrap().unwrap();
        assert!(client.cached(wallet(1)).await.is_empty());

        client.fetch(wallet(2), false).await.unwrap();
        assert_eq!(client.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_custom_ttl_zero_always_refetches() {
        let client = TransactionsClient::with_config(
            MemorySource::default(),
            ClientConfig {
                cache_ttl: Duration::ZERO,
                debounce: DEFAULT_DEBOUNCE,
            },
        );
        client.fetch(wallet(1), false).await.unwrap();
        client.fetch(wallet(1), false).await.unwrap();
        assert_eq!(client.list_calls(), 2);
    }
}
