//! Configuration management for the Proof of Contribution indexer.
//!
//! Configuration is loaded from a TOML file. Values may reference
//! environment variables with `${VAR_NAME}`; references inside TOML
//! comments are left untouched.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    pub network: NetworkConfig,

    /// Contract addresses
    pub contracts: ContractsConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// DataCoin minting and permit signing
    #[serde(default)]
    pub rewards: RewardsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Ethereum RPC URL
    pub rpc_url: String,

    /// Chain ID (e.g., 11155111 for Sepolia)
    pub chain_id: u64,
}

/// Contract addresses configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// StakingManager contract (Staked, CourseCompleted, StakeRefunded)
    pub staking_manager: Address,

    /// DataCoin token contract (TokensMinted, mint)
    pub data_coin: Address,

    /// ProofOfContribution SBT contract, the EIP-712 verifying contract for permits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_contribution: Option<Address>,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://poc.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Block number to start syncing from (0 = from genesis)
    #[serde(default)]
    pub start_block: u64,

    /// Polling interval in seconds for new blocks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Batch size for historical sync (number of blocks per batch)
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Number of confirmations to wait before processing blocks
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Blocks scanned by an on-demand per-user backfill
    #[serde(default = "default_backfill_lookback_blocks")]
    pub backfill_lookback_blocks: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            confirmations: default_confirmations(),
            backfill_lookback_blocks: default_backfill_lookback_blocks(),
        }
    }
}

/// Reward minting configuration.
///
/// Without `minter_private_key` rewards are recorded with synthetic
/// transaction hashes (offline mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Private key of the DataCoin minter account (hex, optional 0x prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minter_private_key: Option<String>,

    /// Private key used to sign manual contribution permits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permit_signer_key: Option<String>,

    /// Gas limit for mint transactions
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Percentage added to the network gas price on the first attempt
    #[serde(default = "default_gas_price_bump_percent")]
    pub gas_price_bump_percent: u64,

    /// Extra percentage added per retry
    #[serde(default = "default_retry_bump_percent")]
    pub retry_bump_percent: u64,

    /// Maximum mint attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit in milliseconds (multiplied by the attempt number)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            minter_private_key: None,
            permit_signer_key: None,
            gas_limit: default_gas_limit(),
            gas_price_bump_percent: default_gas_price_bump_percent(),
            retry_bump_percent: default_retry_bump_percent(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_confirmations() -> u64 {
    2
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_poll_interval_secs() -> u64 {
    12
}

fn default_batch_size() -> u64 {
    1000
}

fn default_backfill_lookback_blocks() -> u64 {
    100
}

fn default_gas_limit() -> u64 {
    200_000
}

fn default_gas_price_bump_percent() -> u64 {
    20
}

fn default_retry_bump_percent() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax.
    /// For example: `minter_private_key = "${MINTER_PRIVATE_KEY}"`
    ///
    /// # Example
    /// ```no_run
    /// # use poc_indexer::config::Config;
    /// let config = Config::from_file("indexer.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            anyhow::bail!("Network RPC URL cannot be empty");
        }
        if self.network.chain_id == 0 {
            anyhow::bail!("Chain ID must be non-zero");
        }

        if self.contracts.staking_manager.is_zero() {
            anyhow::bail!("Contracts staking_manager must be a non-zero address");
        }
        if self.contracts.data_coin.is_zero() {
            anyhow::bail!("Contracts data_coin must be a non-zero address");
        }
        if let Some(poc) = self.contracts.proof_of_contribution {
            if poc.is_zero() {
                anyhow::bail!(
                    "Contracts proof_of_contribution must be a non-zero address when provided"
                );
            }
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.sync.poll_interval_secs == 0 {
            anyhow::bail!("Sync poll_interval_secs must be > 0");
        }
        if self.sync.batch_size == 0 {
            anyhow::bail!("Sync batch_size must be > 0");
        }
        if self.sync.backfill_lookback_blocks == 0 {
            anyhow::bail!("Sync backfill_lookback_blocks must be > 0");
        }

        if let Some(key) = &self.rewards.minter_private_key {
            validate_private_key("Rewards minter_private_key", key)?;
        }
        if let Some(key) = &self.rewards.permit_signer_key {
            validate_private_key("Rewards permit_signer_key", key)?;
        }
        if self.rewards.max_attempts == 0 {
            anyhow::bail!("Rewards max_attempts must be > 0");
        }
        if self.rewards.gas_limit == 0 {
            anyhow::bail!("Rewards gas_limit must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

/// Check a hex private key (64 hex characters, optional 0x prefix).
pub fn validate_private_key(field: &str, key: &str) -> Result<()> {
    let key = key.trim_start_matches("0x");
    if key.len() != 64 {
        anyhow::bail!("{} must be 64 hex characters (got {})", field, key.len());
    }
    if !key.chars().all(|c| c.is_ascii_hexdigit()) {
        anyhow::bail!("{} must be a valid hex string", field);
    }
    Ok(())
}

/// TOML string flavour the scanner is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringKind {
    Basic,
    Literal,
    MultiBasic,
    MultiLiteral,
}

impl StringKind {
    fn delimiter(self) -> &'static str {
        match self {
            StringKind::Basic => "\"",
            StringKind::Literal => "'",
            StringKind::MultiBasic => "\"\"\"",
            StringKind::MultiLiteral => "'''",
        }
    }

    fn allows_escapes(self) -> bool {
        matches!(self, StringKind::Basic | StringKind::MultiBasic)
    }
}

/// Expand `${VAR_NAME}` placeholders outside TOML comments.
///
/// Placeholders are expanded inside strings and bare values alike. A `#`
/// only starts a comment when it is outside every string form.
///
/// # Errors
/// Returns an error if a referenced variable is not set, the name is empty
/// or the placeholder is not closed.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut string: Option<StringKind> = None;
    let mut in_comment = false;
    let mut pos = 0;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            result.push(ch);
            pos += ch.len_utf8();
            continue;
        }

        match string {
            Some(kind) => {
                if ch == '\\' && kind.allows_escapes() {
                    // Copy the escape and the escaped character verbatim
                    let escaped: String = rest.chars().take(2).collect();
                    result.push_str(&escaped);
                    pos += escaped.len();
                    continue;
                }
                if rest.starts_with(kind.delimiter()) {
                    result.push_str(kind.delimiter());
                    pos += kind.delimiter().len();
                    string = None;
                    continue;
                }
                if ch == '\n' && matches!(kind, StringKind::Basic | StringKind::Literal) {
                    // Unterminated single-line string; let the TOML parser report it
                    string = None;
                }
            }
            None => {
                let opened = [
                    StringKind::MultiBasic,
                    StringKind::MultiLiteral,
                    StringKind::Basic,
                    StringKind::Literal,
                ]
                .into_iter()
                .find(|kind| rest.starts_with(kind.delimiter()));

                if let Some(kind) = opened {
                    result.push_str(kind.delimiter());
                    pos += kind.delimiter().len();
                    string = Some(kind);
                    continue;
                }
                if ch == '#' {
                    in_comment = true;
                    result.push(ch);
                    pos += 1;
                    continue;
                }
            }
        }

        if rest.starts_with("${") {
            let name_start = pos + 2;
            let Some(close) = input[name_start..].find('}') else {
                anyhow::bail!(
                    "Unclosed environment variable placeholder at position {}",
                    pos
                );
            };
            let var_name = &input[name_start..name_start + close];
            if var_name.is_empty() {
                anyhow::bail!("Empty environment variable name at position {}", pos);
            }

            let value = std::env::var(var_name).map_err(|_| {
                anyhow::anyhow!(
                    "Environment variable '{}' is not set (referenced at position {})",
                    var_name,
                    pos
                )
            })?;
            result.push_str(&value);
            pos = name_start + close + 1;
            continue;
        }

        result.push(ch);
        pos += ch.len_utf8();
    }

    Ok(result)
}
