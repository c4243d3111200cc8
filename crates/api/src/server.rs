use anyhow::Context;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use poc_core::Address;
use poc_indexer::{
    attestation::{ProofVerifier, WitnessVerifier},
    config::{validate_private_key, LoggingConfig},
    listener::{HistorySource, RpcProvider},
    minter::{DataCoinMinter, MintPolicy, OfflineMinter, RewardMinter},
    pinning::{CertificatePinner, LighthousePinner, LocalPinner, PinataPinner},
    reputation::{ReputationContract, ReputationSource},
    sealing::CertificateSealer,
    storage::Storage,
    verification::{AiVerifierClient, GithubClient, PermitSigner},
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::backfill::BackfillGate;
use crate::error::{internal_error, ApiResult};
use crate::handlers::{
    certificates, consumer, courses, learning, progress, repositories, rewards, stats, transactions, users,
    verify,
};

const DEFAULT_CHAIN_ID: u64 = 11155111;
const DEFAULT_LOOKBACK_BLOCKS: u64 = 100;
const DEFAULT_COOLDOWN_SECS: u64 = 300;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub(crate) storage: Storage,
    pub(crate) minter: Arc<dyn RewardMinter>,
    pub(crate) pinner: Arc<dyn CertificatePinner>,
    pub(crate) sealer: CertificateSealer,
    pub(crate) history: Option<Arc<dyn HistorySource>>,
    pub(crate) backfill_gate: Arc<BackfillGate>,
    pub(crate) lookback_blocks: u64,
    pub(crate) ai_verifier: Option<AiVerifierClient>,
    pub(crate) github: Option<GithubClient>,
    pub(crate) permit_signer: Option<Arc<PermitSigner>>,
    pub(crate) permit_verifier: Option<Address>,
    pub(crate) proof_verifier: Option<Arc<dyn ProofVerifier>>,
    pub(crate) reputation: Option<Arc<dyn ReputationSource>>,
    pub(crate) chain_id: u64,
    pub(crate) verifying_contract: Address,
}

impl AppState {
    /// Replace the on-chain history source used for backfills.
    pub fn with_history_source(mut self, source: Arc<dyn HistorySource>) -> Self {
        self.history = Some(source);
        self
    }

    /// Replace the DataCoin minter.
    pub fn with_minter(mut self, minter: Arc<dyn RewardMinter>) -> Self {
        self.minter = minter;
        self
    }

    /// Replace the certificate pinner.
    pub fn with_pinner(mut self, pinner: Arc<dyn CertificatePinner>) -> Self {
        self.pinner = pinner;
        self
    }

    /// Replace the consumer data proof verifier.
    pub fn with_proof_verifier(mut self, verifier: Arc<dyn ProofVerifier>) -> Self {
        self.proof_verifier = Some(verifier);
        self
    }

    /// Replace the Reputation contract reader.
    pub fn with_reputation_source(mut self, source: Arc<dyn ReputationSource>) -> Self {
        self.reputation = Some(source);
        self
    }

    /// Storage handle.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

/// Runtime configuration for the API server.
#[derive(Debug, Clone)]
pub struct ApiRuntimeConfig {
    database_url: String,
    port: u16,
    rpc_url: Option<String>,
    chain_id: u64,
    staking_manager: Option<Address>,
    data_coin: Option<Address>,
    proof_of_contribution: Option<Address>,
    reputation: Option<Address>,
    minter_private_key: Option<String>,
    permit_signer_key: Option<String>,
    permit_verifier: Option<Address>,
    certificate_key: Option<String>,
    lookback_blocks: u64,
    backfill_cooldown: Duration,
    logging: LoggingConfig,
    external_services: bool,
}

impl ApiRuntimeConfig {
    /// Build runtime configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://poc.db".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let mut logging = LoggingConfig::default();
        if let Some(level) = env_string("LOG_LEVEL") {
            logging.level = level;
        }
        if let Some(format) = env_string("LOG_FORMAT") {
            logging.format = format;
        }

        let minter_private_key = env_string("MINTER_PRIVATE_KEY");
        if let Some(key) = &minter_private_key {
            validate_private_key("MINTER_PRIVATE_KEY", key)?;
        }
        let permit_signer_key = env_string("PERMIT_SIGNER_KEY");
        if let Some(key) = &permit_signer_key {
            validate_private_key("PERMIT_SIGNER_KEY", key)?;
        }
        let certificate_key = env_string("CERTIFICATE_ENCRYPTION_KEY");
        if let Some(key) = &certificate_key {
            CertificateSealer::from_hex(key).context("Invalid CERTIFICATE_ENCRYPTION_KEY")?;
        }

        Ok(Self {
            database_url,
            port,
            rpc_url: env_string("RPC_URL"),
            chain_id: parse_env_u64("CHAIN_ID")?.unwrap_or(DEFAULT_CHAIN_ID),
            staking_manager: parse_env_address("STAKING_MANAGER_ADDRESS")?,
            data_coin: parse_env_address("DATACOIN_ADDRESS")?,
            proof_of_contribution: parse_env_address("SBT_ADDRESS")?,
            reputation: parse_env_address("REPUTATION_ADDRESS")?,
            minter_private_key,
            permit_signer_key,
            permit_verifier: parse_env_address("PERMIT_VERIFIER_ADDRESS")?,
            certificate_key,
            lookback_blocks: parse_env_u64("BACKFILL_LOOKBACK_BLOCKS")?
                .unwrap_or(DEFAULT_LOOKBACK_BLOCKS),
            backfill_cooldown: Duration::from_secs(
                parse_env_u64("BACKFILL_COOLDOWN_SECS")?.unwrap_or(DEFAULT_COOLDOWN_SECS),
            ),
            logging,
            external_services: true,
        })
    }

    /// Offline test configuration: simulated mints, local CIDs, no external
    /// services, a fixed permit signer and a throwaway certificate key.
    pub fn for_test(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            port: 0,
            rpc_url: None,
            chain_id: DEFAULT_CHAIN_ID,
            staking_manager: None,
            data_coin: None,
            proof_of_contribution: Some(Address::repeat_byte(0x42)),
            reputation: None,
            minter_private_key: None,
            permit_signer_key: Some(
                "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d".to_string(),
            ),
            permit_verifier: None,
            certificate_key: None,
            lookback_blocks: DEFAULT_LOOKBACK_BLOCKS,
            backfill_cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            logging: LoggingConfig::default(),
            external_services: false,
        }
    }

    /// Logging settings.
    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_u64(name: &str) -> anyhow::Result<Option<u64>> {
    let Some(raw) = env_string(name) else {
        return Ok(None);
    };
    let v: u64 = raw
        .parse()
        .with_context(|| format!("Invalid {} (expected u64)", name))?;
    Ok(Some(v))
}

fn parse_env_address(name: &str) -> anyhow::Result<Option<Address>> {
    let Some(raw) = env_string(name) else {
        return Ok(None);
    };
    let address =
        poc_core::normalize_address(&raw).with_context(|| format!("Invalid {}", name))?;
    Ok(Some(address))
}

/// Connect storage and construct every service client.
pub async fn build_state(config: &ApiRuntimeConfig) -> anyhow::Result<AppState> {
    let storage = Storage::new(&config.database_url, None, None)
        .await
        .context("Failed to connect to database")?;
    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let minter: Arc<dyn RewardMinter> = match (
        &config.rpc_url,
        config.data_coin,
        &config.minter_private_key,
    ) {
        (Some(rpc), Some(data_coin), Some(key)) => {
            let signer: alloy::signers::local::PrivateKeySigner = key
                .trim_start_matches("0x")
                .parse()
                .context("Invalid MINTER_PRIVATE_KEY")?;
            info!(%data_coin, "DataCoin minting enabled");
            Arc::new(DataCoinMinter::new(
                rpc,
                data_coin,
                signer,
                MintPolicy::default(),
            )?)
        }
        _ => {
            warn!("DataCoin minter not configured, rewards are simulated");
            Arc::new(OfflineMinter::new())
        }
    };

    let history: Option<Arc<dyn HistorySource>> =
        match (&config.rpc_url, config.staking_manager, config.data_coin) {
            (Some(rpc), Some(staking), Some(data_coin)) => {
                Some(Arc::new(RpcProvider::new(rpc, staking, data_coin)?))
            }
            _ => None,
        };

    let reputation: Option<Arc<dyn ReputationSource>> = match (&config.rpc_url, config.reputation) {
        (Some(rpc), Some(contract)) => Some(Arc::new(ReputationContract::new(rpc, contract)?)),
        _ => None,
    };

    let verifying_contract = config.proof_of_contribution.unwrap_or(Address::ZERO);
    let permit_signer = config
        .permit_signer_key
        .as_deref()
        .map(|key| PermitSigner::from_key(key, config.chain_id, verifying_contract))
        .transpose()?
        .map(Arc::new);

    // Permits are checked against the configured verifier, else our own signer.
    let permit_verifier = config
        .permit_verifier
        .or_else(|| permit_signer.as_ref().map(|s| s.address()));

    let sealer = match &config.certificate_key {
        Some(key) => CertificateSealer::from_hex(key)?,
        None => {
            if config.external_services {
                warn!("CERTIFICATE_ENCRYPTION_KEY not set, pinned certificates use a per-process key");
            }
            CertificateSealer::ephemeral()
        }
    };

    let mut pinner: Arc<dyn CertificatePinner> = Arc::new(LocalPinner);
    let mut ai_verifier = None;
    let mut github = None;
    let mut proof_verifier: Option<Arc<dyn ProofVerifier>> = None;
    if config.external_services {
        match WitnessVerifier::from_env()? {
            Some(verifier) => proof_verifier = Some(Arc::new(verifier)),
            None => warn!("RECLAIM_WITNESSES not set, consumer data submissions are disabled"),
        }
        if let Some(lighthouse) = LighthousePinner::from_env()? {
            pinner = Arc::new(lighthouse);
        } else if let Some(pinata) = PinataPinner::from_env()? {
            pinner = Arc::new(pinata);
        } else {
            warn!("Neither LIGHTHOUSE_API_KEY nor PINATA_JWT set, certificates get local CIDs only");
        }
        ai_verifier = Some(AiVerifierClient::from_env()?);
        github = Some(GithubClient::from_env()?);
    }

    Ok(AppState {
        storage,
        minter,
        pinner,
        sealer,
        history,
        backfill_gate: Arc::new(BackfillGate::new(config.backfill_cooldown)),
        lookback_blocks: config.lookback_blocks,
        ai_verifier,
        github,
        permit_signer,
        permit_verifier,
        proof_verifier,
        reputation,
        chain_id: config.chain_id,
        verifying_contract,
    })
}

/// Router over an already built state.
pub fn router_for_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/:address", get(users::get_user))
        .route("/v1/courses", get(courses::list_courses))
        .route(
            "/v1/courses/:id",
            get(courses::get_course)
                .put(courses::upsert_course)
                .delete(courses::delete_course),
        )
        .route("/v1/stakes", post(learning::stake))
        .route(
            "/v1/learning-progress",
            get(learning::get_learning_progress).delete(learning::delete_learning_progress),
        )
        .route(
            "/v1/learning-progress/modules/complete",
            post(learning::complete_module),
        )
        .route(
            "/v1/learning-progress/assignments/submit",
            post(learning::submit_assignment),
        )
        .route(
            "/v1/learning-progress/assignments/verify",
            post(learning::verify_assignment),
        )
        .route("/v1/learning-progress/refund", post(learning::refund_stake))
        .route(
            "/v1/progress",
            get(progress::get_progress).post(progress::claim_progress_reward),
        )
        .route(
            "/v1/transactions",
            get(transactions::list_transactions).post(transactions::add_transaction),
        )
        .route("/v1/stats/users/:address", get(stats::user_stats))
        .route("/v1/stats/repositories", get(repositories::repository_stats))
        .route("/v1/leaderboard", get(stats::leaderboard))
        .route("/v1/reputation", get(stats::reputation_leaderboard))
        .route("/v1/reputation/:address", get(stats::reputation_score))
        .route(
            "/v1/repositories",
            get(repositories::list_repositories).post(repositories::submit_repository),
        )
        .route(
            "/v1/repositories/:id",
            get(repositories::get_repository).put(repositories::update_repository),
        )
        .route("/v1/complete-course", post(certificates::complete_course))
        .route("/v1/certificates", get(certificates::list_certificates))
        .route("/v1/certificates/:cid", get(certificates::get_certificate))
        .route("/v1/rewards", get(rewards::list_rewards))
        .route("/v1/rewards/course", post(rewards::course_reward))
        .route("/v1/verify", post(verify::verify_contribution))
        .route("/v1/manual-verify", post(verify::manual_verify))
        .route("/v1/mint", post(verify::mint_args))
        .route(
            "/v1/consumer-data",
            get(consumer::consumer_data_stats).post(consumer::submit_consumer_data),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Build an in-process API router from explicit runtime config.
pub async fn build_app(config: &ApiRuntimeConfig) -> anyhow::Result<Router> {
    let state = build_state(config).await?;
    Ok(router_for_state(state))
}

/// Run the API server with explicit runtime configuration.
pub async fn run_with_config(config: ApiRuntimeConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let storage_for_shutdown = state.storage.clone();
    let app = router_for_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Proof of Contribution API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    storage_for_shutdown.close().await;
    info!("API server shutdown complete");
    Ok(())
}

/// Run the API server using environment-driven configuration.
pub async fn run_from_env() -> anyhow::Result<()> {
    run_with_config(ApiRuntimeConfig::from_env()?).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    state.storage.health_check().await.map_err(internal_error)?;
    Ok(Json(HealthResponse {
        status: "ok",
        database: "ok",
    }))
}
