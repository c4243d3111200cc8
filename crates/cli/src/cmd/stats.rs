use anyhow::{Context, Result};
use clap::Args;
use poc_core::{normalize_address, stats::user_stats};

use super::db::DatabaseArgs;

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    db: DatabaseArgs,

    /// Wallet address (0x...)
    #[arg(long)]
    address: String,
}

#[derive(Debug, Args)]
pub struct RepoStatsArgs {
    #[command(flatten)]
    db: DatabaseArgs,
}

pub async fn run_user(args: StatsArgs) -> Result<()> {
    let user = normalize_address(&args.address).context("Invalid --address")?;
    let storage = args.db.open().await?;
    let txs = storage.list_transactions(&user).await?;
    storage.close().await;

    let stats = user_stats(&txs, chrono::Utc::now().timestamp());
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

pub async fn run_repositories(args: RepoStatsArgs) -> Result<()> {
    let storage = args.db.open().await?;
    let stats = storage.repository_stats().await?;
    storage.close().await;

    println!("repositories: {}", stats.total_repositories);
    println!("  pending: {}", stats.pending_repositories);
    println!("  approved: {}", stats.approved_repositories);
    println!("  rejected: {}", stats.rejected_repositories);
    println!("commits: {}", stats.total_commits);
    println!("  verified: {}", stats.verified_commits);
    println!("dataCoinsEarned: {}", stats.total_data_coins_earned);
    Ok(())
}
