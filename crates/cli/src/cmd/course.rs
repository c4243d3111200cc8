use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use poc_indexer::storage::Course;
use std::path::{Path, PathBuf};

use super::db::DatabaseArgs;

#[derive(Debug, Subcommand)]
pub enum CourseCommand {
    /// Insert or replace a course from a JSON or TOML file.
    Upsert(UpsertArgs),
}

#[derive(Debug, Args)]
pub struct UpsertArgs {
    #[command(flatten)]
    db: DatabaseArgs,

    /// Course definition (.json or .toml)
    #[arg(long)]
    file: PathBuf,
}

pub async fn run(command: CourseCommand) -> Result<()> {
    match command {
        CourseCommand::Upsert(args) => upsert(args).await,
    }
}

async fn upsert(args: UpsertArgs) -> Result<()> {
    let course = read_course(&args.file)?;
    let storage = args.db.open().await?;
    let stored = storage.upsert_course(&course).await?;
    storage.close().await;

    println!(
        "Upserted course {} \"{}\" ({} modules, stake {} ETH)",
        stored.id,
        stored.title,
        stored.total_modules(),
        stored.stake_amount
    );
    Ok(())
}

/// Parse a course file, picking the format from the extension.
pub fn read_course(path: &Path) -> Result<Course> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let course: Course = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&raw)
            .with_context(|| format!("Invalid course JSON in {}", path.display()))?,
        Some("toml") => toml::from_str(&raw)
            .with_context(|| format!("Invalid course TOML in {}", path.display()))?,
        _ => bail!("Unsupported course file {}, expected .json or .toml", path.display()),
    };

    for (index, module) in course.modules.iter().enumerate() {
        if module.id as usize != index + 1 {
            bail!(
                "Module ids must run 1..{}, found {} at position {}",
                course.modules.len(),
                module.id,
                index + 1
            );
        }
    }
    Ok(course)
}
