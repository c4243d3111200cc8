use anyhow::Result;
use clap::{Parser, Subcommand};
use poc_indexer::{config::LoggingConfig, logging::init_logging};

mod cmd;

#[derive(Debug, Parser)]
#[command(name = "poc")]
#[command(about = "Proof of Contribution operator CLI")]
struct Cli {
    /// Log level for diagnostics on stderr
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database and apply migrations.
    InitDb(cmd::db::InitDbArgs),
    /// Manage the course catalogue.
    #[command(subcommand)]
    Course(cmd::course::CourseCommand),
    /// Sign a contribution permit with a local verifier key.
    SignPermit(cmd::permit::SignPermitArgs),
    /// Print dashboard statistics of a user.
    Stats(cmd::stats::StatsArgs),
    /// Print repository review statistics.
    RepoStats(cmd::stats::RepoStatsArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(
        &LoggingConfig {
            level: cli.log_level,
            format: "pretty".to_string(),
        },
        false,
    )?;

    match cli.command {
        Command::InitDb(args) => cmd::db::run_init(args).await?,
        Command::Course(command) => cmd::course::run(command).await?,
        Command::SignPermit(args) => cmd::permit::run(args).await?,
        Command::Stats(args) => cmd::stats::run_user(args).await?,
        Command::RepoStats(args) => cmd::stats::run_repositories(args).await?,
    }

    Ok(())
}
