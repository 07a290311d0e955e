//! HTTP error type for ferry-cv

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::convert::{ConfigError, ConvertError};

#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Rejected conversion configuration (400)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Conflict (409), a conversion page is already running
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("Common error: {0}")]
    Common(#[from] ferry_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Config(ref err) => (StatusCode::BAD_REQUEST, "CONFIG_ERROR", err.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Convert(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONVERSION_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
