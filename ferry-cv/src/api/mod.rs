//! HTTP API

mod auth;
mod convert;
mod health;

pub use auth::{auth_middleware, AuthError};
pub use convert::{
    conversion_status, convert, list_platforms, upgrade_password, ConvertRequest, PasswordRequest,
    PasswordResponse, StatusResponse,
};
pub use health::{health_check, health_routes, HealthResponse};
