//! API Server Binary Entry Point

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use video_pipeline_api_server::{start_server, ApiState};
use video_pipeline_binary::install_all;
use video_pipeline_core::PipelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_pipeline_api_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::load().context("loading pipeline config")?;
    let state = ApiState::new(config).context("registering built-in modules")?;

    match install_all(&state.registry, &state.config.binaries_dir) {
        Ok(report) if !report.skipped.is_empty() => {
            warn!("{} binaries could not be installed", report.skipped.len());
        }
        Ok(_) => {}
        Err(e) => warn!("Binary scan failed: {}", e),
    }
    info!("{} module classes available", state.registry.len());

    let addr = std::env::var("API_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    start_server(&addr, state).await?;

    Ok(())
}
