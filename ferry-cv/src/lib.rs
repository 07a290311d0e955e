//! ferry-cv library - legacy data conversion service
//!
//! Imports a legacy forum schema into the ferry data model one page per
//! request, so a client-side timer can drive a long migration through short
//! HTTP calls.

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub mod api;
pub mod convert;
pub mod destination;
pub mod error;
pub mod source;

use source::AdapterRegistry;

/// Page size used when neither the request nor the settings table names one
pub const DEFAULT_ROWS_PER_PAGE: i64 = 100;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Service database (destination store and settings)
    pub db: SqlitePool,
    /// Shared secret for API authentication, 0 disables the check
    pub shared_secret: i64,
    pub registry: Arc<AdapterRegistry>,
    /// Whether legacy lookups use the id map table
    pub lookup_table: bool,
    pub default_rows_per_page: i64,
    /// Held for the duration of one conversion page
    pub run_lease: Arc<Mutex<()>>,
    pub startup_time: DateTime<Utc>,
    /// Last fatal conversion message, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, shared_secret: i64, registry: AdapterRegistry) -> Self {
        Self {
            db,
            shared_secret,
            registry: Arc::new(registry),
            lookup_table: false,
            default_rows_per_page: DEFAULT_ROWS_PER_PAGE,
            run_lease: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Only set when the id map table exists in `db`
    pub fn with_lookup_table(mut self, enabled: bool) -> Self {
        self.lookup_table = enabled;
        self
    }

    pub fn with_default_rows_per_page(mut self, rows: i64) -> Self {
        self.default_rows_per_page = rows;
        self
    }
}

/// Build application router
///
/// Conversion endpoints sit behind the authentication middleware; status,
/// platform listing and health are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    let protected = Router::new()
        .route("/convert", post(api::convert))
        .route("/convert/password", post(api::upgrade_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/convert/status", get(api::conversion_status))
        .route("/convert/platforms", get(api::list_platforms))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
