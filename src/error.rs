use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;

/// Custom error type for build_pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Publish failed: {0}")]
    PublishError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl PipelineError {
    /// HTTP status reported to the webhook sender.
    ///
    /// Client mistakes map to 4xx, a failed publish maps to 502 since the
    /// fault lies with the upstream topic service.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PublishError(_) => StatusCode::BAD_GATEWAY,
            Self::ConfigError(_)
            | Self::JsonError(_)
            | Self::IoError(_)
            | Self::TomlParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // never echo why a signature check failed
            Self::Unauthorized(_) => "invalid webhook signature".to_string(),
            Self::ConfigError(_) | Self::IoError(_) | Self::TomlParseError(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Helper type for Results that use PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;
