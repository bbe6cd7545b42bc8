//! HTTP request handlers for API endpoints

use axum::{
    extract::{ws::WebSocketUpgrade, Path as UrlPath, State},
    response::IntoResponse,
    Json,
};
use std::path::{Component, Path, PathBuf};
use tracing::info;
use video_pipeline_binary::{install, list_binaries, BinarySummary};
use video_pipeline_common::VideoResource;
use video_pipeline_core::{
    Composer, ModuleDescriptor, PipelineConfig, PipelineGraph, PipelineRequest, PipelineResponse,
};
use video_pipeline_metrics::compare_luma_series;

use crate::{
    error::ApiError,
    stream::stream_session,
    types::{CompareRequest, CompareResponse, HealthResponse},
    ApiState,
};

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Descriptors of every registered module class, sorted by id
pub async fn list_modules(State(state): State<ApiState>) -> Json<Vec<ModuleDescriptor>> {
    Json(state.registry.descriptors())
}

/// Run a graph to completion and return the artifact locators
pub async fn submit_pipeline(
    State(state): State<ApiState>,
    Json(request): Json<PipelineRequest>,
) -> Result<Json<PipelineResponse>, ApiError> {
    info!("Pipeline request with {} modules", request.modules.len());
    let outcome = tokio::task::spawn_blocking(move || {
        let graph = PipelineGraph::build(&request, &state.registry)?;
        Composer::new(&state.config).run(&graph)
    })
    .await??;
    info!(
        "Pipeline finished: {} ticks, left={}, right={}",
        outcome.ticks,
        outcome.left.locator(),
        outcome.right.locator()
    );
    Ok(Json(outcome.response()))
}

/// Open a live stream; the first text message carries the pipeline request
pub async fn ws_pipeline(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_session(socket, state))
}

/// External binaries available for installation on this platform
pub async fn list_installable(
    State(state): State<ApiState>,
) -> Result<Json<Vec<BinarySummary>>, ApiError> {
    let dir = state.config.binaries_dir.clone();
    let summaries = tokio::task::spawn_blocking(move || list_binaries(&dir)).await??;
    Ok(Json(summaries))
}

/// Register one external binary as a module class
pub async fn install_binary(
    State(state): State<ApiState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<ModuleDescriptor>, ApiError> {
    if !is_plain_name(&name) {
        return Err(ApiError::BadRequest(format!("invalid binary name: {name}")));
    }
    let descriptor = tokio::task::spawn_blocking(move || {
        install(&state.registry, &state.config.binaries_dir, &name)
    })
    .await??;
    Ok(Json(descriptor))
}

/// Luma PSNR/SSIM between two stored raw files
pub async fn compare_metrics(
    State(state): State<ApiState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, ApiError> {
    let left = stored_video(&state.config, &request.left)?;
    let right = stored_video(&state.config, &request.right)?;
    let metrics = tokio::task::spawn_blocking(move || {
        compare_luma_series(&left, &right, request.max_frames)
    })
    .await??;
    Ok(Json(CompareResponse {
        frames: metrics.len(),
        metrics,
    }))
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Resolve a locator against the output directory, then the video directory
fn resolve_locator(config: &PipelineConfig, locator: &str) -> Result<PathBuf, ApiError> {
    let relative = Path::new(locator);
    if locator.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(ApiError::BadRequest(format!("invalid locator: {locator}")));
    }
    let produced = config.output_dir.join(relative);
    if produced.is_file() {
        return Ok(produced);
    }
    let uploaded = config.video_dir.join(relative);
    Ok(if uploaded.is_file() { uploaded } else { produced })
}

fn stored_video(config: &PipelineConfig, locator: &str) -> Result<VideoResource, ApiError> {
    let path = resolve_locator(config, locator)?;
    VideoResource::from_raw_name(path, config.default_fps).ok_or_else(|| {
        ApiError::BadRequest(format!("cannot infer frame geometry from {locator}"))
    })
}
