//! Storage layer for Proof of Contribution.
//!
//! This module provides database operations for:
//! - Users and the course catalogue
//! - Learning progress (compare-and-swap on a version column)
//! - Transactions (durable, deduplicated per user/hash/kind)
//! - Repository submissions and commit review
//! - Certificates
//! - Consumer data contributions
//! - Sync state (chain ingestion checkpoint)

use alloy::primitives::Address;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub mod certificates;
pub mod consumer_data;
pub mod courses;
pub mod progress;
pub mod repositories;
pub mod sync;
pub mod transactions;
pub mod types;
pub mod users;

pub use repositories::CommitReview;
pub use types::*;

/// Default maximum pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default minimum pool size.
const DEFAULT_MIN_CONNECTIONS: u32 = 1;

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database storage shared by the API and the indexer.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// This will create the database file if it doesn't exist. Call
    /// [`Storage::run_migrations`] before first use.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (e.g., "sqlite://poc.db")
    /// * `max_connections` - Pool size (default 5)
    /// * `min_connections` - Idle connections kept open (default 1)
    ///
    /// # Example
    /// ```no_run
    /// # use poc_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://poc.db", None, None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS))
            .min_connections(min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let database_url = format!("sqlite://{}", path.display());
        Self::new(&database_url, None, None).await
    }

    /// Run database migrations.
    ///
    /// This should be called once during initialization to ensure the schema is up to date.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let sync_state = self.get_sync_state().await?;

        Ok(DatabaseStats {
            user_count: self.count_rows("users").await?,
            course_count: self.count_rows("courses").await?,
            progress_count: self.count_rows("learning_progress").await?,
            transaction_count: self.count_rows("transactions").await?,
            repository_count: self.count_rows("repositories").await?,
            certificate_count: self.count_rows("certificates").await?,
            last_block_number: sync_state.last_block_number,
        })
    }

    async fn count_rows(&self, table: &'static str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", table))?;
        Ok(count as u64)
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// Database statistics.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    /// Registered users
    pub user_count: u64,

    /// Catalogue courses
    pub course_count: u64,

    /// Learning progress records
    pub progress_count: u64,

    /// Stored transactions
    pub transaction_count: u64,

    /// Submitted repositories
    pub repository_count: u64,

    /// Pinned certificates
    pub certificate_count: u64,

    /// Last processed block number
    pub last_block_number: u64,
}

/// Lowercase column value of an address.
pub(crate) fn address_column(address: &Address) -> String {
    poc_core::address_key(address)
}

/// Parse an address column.
pub(crate) fn parse_address_column(value: &str) -> Result<Address> {
    Address::from_str(value).with_context(|| format!("Invalid stored address: {}", value))
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}


#[cfg(test)]
mod tests {
    use super::test_support::setup_storage;

    #[tokio::test]
    async fn test_storage_creation() {
        let (storage, _temp_db) = setup_storage().await;

        // Verify connection works
        storage.health_check().await.unwrap();

        storage.close().await;
    }

    #[tokio::test]
    async fn test_database_stats() {
        let (storage, _temp_db) = setup_storage().await;

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.user_count, 0);
        assert_eq!(stats.course_count, 0);
        assert_eq!(stats.transaction_count, 0);
        assert_eq!(stats.repository_count, 0);
        assert_eq!(stats.last_block_number, 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (storage, _temp_db) = setup_storage().await;
        storage.run_migrations().await.unwrap();
        storage.health_check().await.unwrap();
    }
}
