//! Mapping of library errors onto HTTP responses

use crate::types::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};
use video_pipeline_binary::BinaryError;
use video_pipeline_core::PipelineError;
use video_pipeline_metrics::MetricsError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Binary(#[from] BinaryError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {err}"))
    }
}

fn pipeline_status(category: &str) -> StatusCode {
    match category {
        "graph" | "parameter" => StatusCode::UNPROCESSABLE_ENTITY,
        "resource" => StatusCode::NOT_FOUND,
        "process" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    /// Status code, category and detail payload
    #[must_use]
    pub fn parts(&self) -> (StatusCode, &'static str, serde_json::Value) {
        match self {
            ApiError::Pipeline(e) => {
                let details = match e {
                    PipelineError::Graph(errors) => json!(errors),
                    PipelineError::Parameters(errors) => json!(errors),
                    PipelineError::Process {
                        program,
                        status,
                        stdout,
                        stderr,
                    } => json!({
                        "program": program,
                        "status": status,
                        "stdout": stdout,
                        "stderr": stderr,
                    }),
                    PipelineError::Module { node, .. } => json!({ "node": node }),
                    _ => serde_json::Value::Null,
                };
                (pipeline_status(e.category()), e.category(), details)
            }
            ApiError::Binary(e) => match e {
                BinaryError::NotFound(_) => (StatusCode::NOT_FOUND, "resource", serde_json::Value::Null),
                BinaryError::Failed {
                    program,
                    status,
                    stdout,
                    stderr,
                } => (
                    StatusCode::BAD_GATEWAY,
                    "process",
                    json!({
                        "program": program,
                        "status": status,
                        "stdout": stdout,
                        "stderr": stderr,
                    }),
                ),
                BinaryError::Spawn { .. } => (StatusCode::BAD_GATEWAY, "process", serde_json::Value::Null),
                BinaryError::InvalidConfig { .. }
                | BinaryError::Descriptor(_)
                | BinaryError::Json(_)
                | BinaryError::MissingParameter(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "parameter", serde_json::Value::Null)
                }
                BinaryError::Registry(_) | BinaryError::Io(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal", serde_json::Value::Null)
                }
            },
            ApiError::Metrics(MetricsError::Open { path, .. }) => (
                StatusCode::NOT_FOUND,
                "resource",
                json!({ "path": path.display().to_string() }),
            ),
            ApiError::Metrics(MetricsError::Codec(_)) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", serde_json::Value::Null)
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "request", serde_json::Value::Null),
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let (_, category, details) = self.parts();
        ErrorBody {
            category: category.to_string(),
            message: self.to_string(),
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, _, _) = self.parts();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected: {}", self);
        }
        (status, Json(self.body())).into_response()
    }
}
