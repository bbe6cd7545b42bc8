//! REST and WebSocket front end for the video pipeline
//!
//! - Batch runs: submit a graph, get artifact locators and per-tick metrics
//! - Live runs: stream PNG pairs and metrics over a WebSocket
//! - Module and external-binary discovery, binary installation

mod error;
mod handlers;
mod stream;
mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use video_pipeline_core::{ModuleRegistry, PipelineConfig};
use video_pipeline_modules::{default_registry, BuiltinError};

pub use error::ApiError;
pub use handlers::*;
pub use stream::{encode_png, produce_ticks, stream_session, StreamTick};
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    /// Built-in and installed module classes
    pub registry: Arc<ModuleRegistry>,
    pub config: Arc<PipelineConfig>,
}

impl ApiState {
    /// State with the built-in modules registered
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in descriptor is invalid.
    pub fn new(config: PipelineConfig) -> Result<Self, BuiltinError> {
        Ok(Self::with_registry(config, default_registry()?))
    }

    #[must_use]
    pub fn with_registry(config: PipelineConfig, registry: ModuleRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Pipelines
        .route("/api/v1/pipeline", post(submit_pipeline))
        .route("/ws/pipeline", get(ws_pipeline))
        // Discovery
        .route("/api/v1/modules", get(list_modules))
        .route("/api/v1/binaries", get(list_installable))
        .route("/api/v1/binaries/{name}/install", post(install_binary))
        // Metrics over stored artifacts
        .route("/api/v1/metrics/compare", post(compare_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    axum::serve(listener, build_router(state)).await
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}
