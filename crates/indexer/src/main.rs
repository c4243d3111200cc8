//! Proof of Contribution indexer
//!
//! This binary provides:
//! - Event ingestion from Ethereum (StakingManager + DataCoin)
//! - Durable transaction storage for the dashboard
//! - On-demand per-user backfill
//!
//! Note: The HTTP API is provided by the separate `poc-api` service

use alloy::primitives::B256;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use poc_indexer::config::{Config, LoggingConfig};
use poc_indexer::listener::{backfill_user, RpcProvider, SyncEngine};
use poc_indexer::logging::init_logging;
use poc_indexer::storage::Storage;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "poc-indexer")]
#[command(version, about = "Proof of Contribution chain indexer", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml", env = "POC_INDEXER_CONFIG")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sync engine
    Run,

    /// Show sync progress and database statistics
    Status,

    /// Fetch recent on-chain history of one user
    Backfill {
        /// Wallet address
        #[arg(long)]
        address: String,

        /// Blocks to look back (default: sync.backfill_lookback_blocks)
        #[arg(long)]
        lookback: Option<u64>,
    },

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://poc.db", env = "DATABASE_URL")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging, cli.debug)?;
            run_indexer(config).await?
        }
        Commands::Status => {
            init_logging(&LoggingConfig::default(), cli.debug)?;
            show_status(&cli.config).await?
        }
        Commands::Backfill { address, lookback } => {
            let config = load_config(&cli.config)?;
            init_logging(&config.logging, cli.debug)?;
            run_backfill(config, &address, lookback).await?
        }
        Commands::InitDb { database_url } => {
            init_logging(&LoggingConfig::default(), cli.debug)?;
            init_database(&database_url).await?
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load configuration from {}", path))
}

async fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Main indexer service
async fn run_indexer(config: Config) -> Result<()> {
    info!("Proof of Contribution indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("  Chain ID: {}", config.network.chain_id);
    info!("  RPC URL: {}", config.network.rpc_url);
    info!("  Database: {}", config.database.url);
    info!("  Start block: {}", config.sync.start_block);

    let storage = open_storage(&config).await?;
    info!("Database initialized");

    let provider = RpcProvider::new(
        &config.network.rpc_url,
        config.contracts.staking_manager,
        config.contracts.data_coin,
    )
    .context("Failed to create RPC provider")?;

    let remote_chain = provider.get_chain_id().await?;
    if remote_chain != config.network.chain_id {
        anyhow::bail!(
            "RPC chain id {} does not match configured chain id {}",
            remote_chain,
            config.network.chain_id
        );
    }

    let sync_state = storage.get_sync_state().await?;
    if sync_state.chain_id == 0 {
        // Logs are fetched from last_block + 1, so start one block earlier
        let initial_block = config.sync.start_block.saturating_sub(1);
        info!(
            "Fresh database detected, initializing sync state with chain_id={} initial_block={}",
            config.network.chain_id, initial_block
        );
        storage
            .initialize_sync_state(config.network.chain_id, initial_block, B256::ZERO)
            .await?;
    } else if sync_state.chain_id != config.network.chain_id {
        anyhow::bail!(
            "Database was indexed for chain {} but config targets chain {}",
            sync_state.chain_id,
            config.network.chain_id
        );
    } else {
        info!(
            "Existing sync state found: chain_id={} last_block={}",
            sync_state.chain_id, sync_state.last_block_number
        );
    }

    let sync_engine = SyncEngine::new(provider, storage.clone(), config.sync.clone());
    let sync_handle = tokio::spawn(async move { sync_engine.run().await });

    info!("Indexer is running. Press Ctrl+C to stop.");

    tokio::select! {
        result = sync_handle => {
            storage.close().await;
            match result {
                Ok(Ok(())) => {
                    warn!("Sync engine exited unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => Err(e).context("Sync engine failed"),
                Err(e) => Err(anyhow::anyhow!("Sync task panicked: {}", e)),
            }
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            storage.close().await;
            Ok(())
        }
    }
}

async fn run_backfill(config: Config, address: &str, lookback: Option<u64>) -> Result<()> {
    let user = poc_indexer::normalize_address(address)?;
    let storage = open_storage(&config).await?;
    let provider = RpcProvider::new(
        &config.network.rpc_url,
        config.contracts.staking_manager,
        config.contracts.data_coin,
    )?;

    let lookback = lookback.unwrap_or(config.sync.backfill_lookback_blocks);
    let stored = backfill_user(&provider, &storage, user, lookback).await?;
    println!("Stored {} new transactions for {:#x}", stored, user);

    storage.close().await;
    Ok(())
}

/// Show sync progress and database statistics
async fn show_status(config_path: &str) -> Result<()> {
    let (database_url, max_conn, min_conn) = match Config::from_file(config_path) {
        Ok(config) => {
            info!("Using database from config: {}", config.database.url);
            (
                config.database.url,
                Some(config.database.max_connections),
                Some(config.database.min_connections),
            )
        }
        Err(e) => {
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
            });

            if is_not_found {
                info!("Config file not found, using default database: sqlite://poc.db");
                ("sqlite://poc.db".to_string(), None, None)
            } else {
                return Err(e).context("Failed to load config file");
            }
        }
    };

    let storage = Storage::new(&database_url, max_conn, min_conn)
        .await
        .context("Failed to connect to database")?;
    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let sync_state = storage.get_sync_state().await?;
    let stats = storage.stats().await?;
    let repos = storage.repository_stats().await?;

    println!("\n=== Proof of Contribution Indexer Status ===\n");
    println!("Sync Progress:");
    println!("  Chain ID: {}", sync_state.chain_id);
    println!("  Last Block: {}", sync_state.last_block_number);
    println!("  Last Block Hash: {}", sync_state.last_block_hash);
    println!(
        "  Last Updated: {}",
        chrono::DateTime::from_timestamp(sync_state.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nDatabase Statistics:");
    println!("  Users: {}", stats.user_count);
    println!("  Courses: {}", stats.course_count);
    println!("  Learning Progress: {}", stats.progress_count);
    println!("  Transactions: {}", stats.transaction_count);
    println!("  Certificates: {}", stats.certificate_count);
    println!(
        "  Repositories: {} ({} pending, {} approved, {} rejected)",
        repos.total_repositories,
        repos.pending_repositories,
        repos.approved_repositories,
        repos.rejected_repositories
    );
    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Courses: {}", stats.course_count);
    info!("  Transactions: {}", stats.transaction_count);
    info!("  Last block: {}", stats.last_block_number);

    storage.close().await;

    Ok(())
}
