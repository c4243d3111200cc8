use poc_api::ApiRuntimeConfig;
use poc_indexer::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiRuntimeConfig::from_env()?;
    init_logging(config.logging(), false)?;
    poc_api::run_with_config(config).await
}
