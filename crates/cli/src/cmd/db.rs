use anyhow::Result;
use clap::Args;
use poc_indexer::storage::Storage;

#[derive(Debug, Args)]
pub struct DatabaseArgs {
    /// Database URL (e.g. sqlite://poc.db)
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://poc.db")]
    pub database_url: String,
}

impl DatabaseArgs {
    /// Connect and bring the schema up to date.
    pub async fn open(&self) -> Result<Storage> {
        let storage = Storage::new(&self.database_url, Some(1), Some(1)).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }
}

#[derive(Debug, Args)]
pub struct InitDbArgs {
    #[command(flatten)]
    db: DatabaseArgs,
}

pub async fn run_init(args: InitDbArgs) -> Result<()> {
    let storage = args.db.open().await?;
    let stats = storage.stats().await?;
    storage.close().await;

    println!("Database ready: {}", args.db.database_url);
    println!("users: {}", stats.user_count);
    println!("courses: {}", stats.course_count);
    println!("transactions: {}", stats.transaction_count);
    println!("repositories: {}", stats.repository_count);
    println!("certificates: {}", stats.certificate_count);
    Ok(())
}
