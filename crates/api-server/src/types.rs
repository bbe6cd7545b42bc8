//! API request and response types

use serde::{Deserialize, Serialize};
use video_pipeline_common::MetricRecord;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error class: graph, parameter, resource, process, module, request, internal
    pub category: String,
    pub message: String,
    /// Structured detail (validation error list, captured process output)
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Luma comparison of two raw planar files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    /// File name in the output or video directory
    pub left: String,
    pub right: String,
    /// Stop after this many frame pairs
    #[serde(default)]
    pub max_frames: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareResponse {
    pub frames: usize,
    pub metrics: Vec<MetricRecord>,
}

/// Messages sent to live-stream clients as text frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Precedes the left and right payloads of one tick
    Metadata {
        tick: u64,
        fps: f64,
        mime: String,
        metrics: MetricRecord,
    },
    /// The source is exhausted
    End { ticks: u64 },
    /// The run failed; no further frames follow
    Error(ErrorBody),
}
