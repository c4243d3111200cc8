//! Tracing subscriber setup shared by the binaries.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.level`; `debug` forces debug output for the
/// workspace crates, tower-http and sqlx.
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<()> {
    let env_filter = if debug {
        EnvFilter::new("poc_indexer=debug,poc_api=debug,tower_http=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "poc_indexer={level},poc_api={level},tower_http={level}",
                level = config.level
            ))
        })
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()?;
    }

    Ok(())
}
