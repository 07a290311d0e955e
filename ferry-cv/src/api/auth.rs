//! Capability gate for conversion requests
//!
//! Every protected request carries `timestamp` and `hash` in its JSON body;
//! the hash covers the canonical body plus the shared secret.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use ferry_common::api::auth::{authenticate_body, ApiAuthError};
use serde_json::{json, Value};
use tracing::warn;

use crate::AppState;

/// Conversion requests are small; anything larger is rejected unread
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Verify the request body before a conversion route runs
///
/// A shared secret of 0 disables the check.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let route = format!("{} {}", parts.method, parts.uri.path());

    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AuthError::Unreadable(format!("Failed to read body: {}", e)))?;
    let json_value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| AuthError::Unreadable(format!("Invalid JSON: {}", e)))?;

    if let Err(e) = authenticate_body(&json_value, state.shared_secret) {
        match &e {
            ApiAuthError::InvalidHash { provided, calculated } => {
                warn!(
                    route = %route,
                    provided = %provided,
                    calculated = %calculated,
                    "Rejected conversion request: bad hash"
                );
            }
            other => warn!(route = %route, "Rejected conversion request: {}", other),
        }
        return Err(AuthError::Rejected(e));
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

#[derive(Debug)]
pub enum AuthError {
    /// Body could not be read as JSON
    Unreadable(String),
    Rejected(ApiAuthError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::Unreadable(_) | AuthError::Rejected(ApiAuthError::MissingFields(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            AuthError::Rejected(ApiAuthError::DatabaseError(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            AuthError::Rejected(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        };
        let message = match self {
            AuthError::Unreadable(msg) => msg,
            AuthError::Rejected(e) => e.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
