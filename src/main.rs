use build_pipeline::error::{PipelineError, Result};
use build_pipeline::logging::setup_logging;
use build_pipeline::publisher::SnsPublisher;
use build_pipeline::{AppState, build_router, load_config};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: &str = "8080";
const DEFAULT_CONFIG_PATH: &str = "pipeline_config.toml";

async fn run() -> Result<()> {
    let config_path =
        std::env::var("PIPELINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| DEFAULT_PORT.to_string());

    let mut config = load_config(&config_path)?;
    config.apply_secret_override(std::env::var("WEBHOOK_SECRET_TOKEN").ok());

    let _log_guard = setup_logging(&config.logging)?;

    info!("Using config at {:?}", config_path);
    if !config.has_webhook_secret() {
        warn!("No webhook secret configured; request signatures will not be verified");
    }

    let publisher = SnsPublisher::from_config(&config.sns).await;
    let state = Arc::new(AppState::new(config, Arc::new(publisher)));
    let app = build_router(state);

    let address = format!("{}:{}", bind_address, port);
    let listener = tokio::net::TcpListener::bind(&address).await.map_err(|e| {
        PipelineError::ConfigError(format!("Failed to bind to {}: {}", address, e))
    })?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    if let Err(e) = run().await {
        eprintln!("build_pipeline: {}", e);
        std::process::exit(1);
    }
}
