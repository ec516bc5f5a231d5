//! Gateway runtime error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gatehouse_kernel::ConfigError;
use serde_json::json;
use thiserror::Error;

/// Gateway-level errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid redirect target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("request path '{0}' is not acceptable")]
    InvalidPath(String),

    #[error("value for header '{0}' contains invalid characters")]
    InvalidHeader(&'static str),

    #[error("no origin configured to serve '{0}'")]
    NoOrigin(String),

    #[error("origin request failed: {0}")]
    Origin(#[source] reqwest::Error),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::NoOrigin(_) => (StatusCode::NOT_FOUND, "NO_ORIGIN"),
            GatewayError::Origin(_) => (StatusCode::BAD_GATEWAY, "ORIGIN_UNAVAILABLE"),
            GatewayError::Body(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            GatewayError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "INVALID_PATH"),
            GatewayError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            GatewayError::InvalidTarget { .. } | GatewayError::InvalidHeader(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "REDIRECT_FAILED")
            }
            GatewayError::Io(_) | GatewayError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
