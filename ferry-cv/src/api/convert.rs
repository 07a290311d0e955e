//! Conversion endpoints
//!
//! `POST /convert` runs one step action per call and answers with a one-line
//! HTML status. The client keeps calling until the line reads
//! "Conversion Complete" or contains "error".

use axum::{
    extract::State,
    response::Html,
    Json,
};
use ferry_common::db::get_setting;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::convert::passwords::{self, PasswordUpgrade};
use crate::convert::query::validate_identifier;
use crate::convert::{
    ConfigError, ConversionOptions, SettingsStepStore, Step, StepController, StepState, StepStore,
};
use crate::destination::SqliteDestination;
use crate::error::{ApiError, ApiResult};
use crate::source::{PlatformInfo, SourceConnection, SourceDb};
use crate::AppState;

/// Settings key overriding the service default page size
pub const ROWS_PER_PAGE_SETTING: &str = "convert_rows_per_page";

const PROCESS_ACTION: &str = "process";

/// `timestamp` and `hash` are consumed by the authentication middleware
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    pub action: String,
    pub platform: String,
    #[serde(default)]
    pub rows_per_page: Option<i64>,
    #[serde(default)]
    pub restart: bool,
    #[serde(default)]
    pub clean: bool,
    #[serde(default)]
    pub convert_users: bool,
    #[serde(default)]
    pub source_connection: SourceConnection,
}

/// POST /convert
pub async fn convert(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> ApiResult<Html<String>> {
    if request.action != PROCESS_ACTION {
        return Err(ConfigError::UnsupportedAction(request.action).into());
    }

    let adapter = state.registry.create(&request.platform)?;
    let connection = &request.source_connection;
    if connection.name.trim().is_empty() {
        return Err(ConfigError::MissingDatabaseName.into());
    }
    validate_identifier(&connection.table_prefix)
        .map_err(|_| ConfigError::InvalidTablePrefix(connection.table_prefix.clone()))?;
    let rows_per_page = resolve_rows_per_page(&state, request.rows_per_page).await?;

    let _lease = state
        .run_lease
        .try_lock()
        .map_err(|_| ApiError::Conflict("a conversion page is already running".to_string()))?;

    let source = SourceDb::connect(connection)
        .await
        .map_err(ConfigError::SourceUnavailable)?;
    let states = SettingsStepStore::new(state.db.clone());
    let store = SqliteDestination::new(state.db.clone(), state.lookup_table);

    let options = ConversionOptions {
        restart: request.restart,
        clean: request.clean,
        convert_users: request.convert_users,
        rows_per_page,
    };
    let controller = StepController::new(
        &states,
        &store,
        &source,
        adapter.as_ref(),
        &connection.table_prefix,
    );
    let message = controller.advance(&options).await;
    source.close().await;

    if message.is_error() {
        *state.last_error.write().await = Some(message.text());
    } else if message.is_complete() {
        info!(platform = %request.platform, "Conversion finished");
    }

    Ok(Html(message.render()))
}

/// Request value, then the settings table, then the service default
async fn resolve_rows_per_page(state: &AppState, requested: Option<i64>) -> ApiResult<i64> {
    let rows = match requested {
        Some(rows) => rows,
        None => get_setting(&state.db, ROWS_PER_PAGE_SETTING)
            .await?
            .unwrap_or(state.default_rows_per_page),
    };

    if rows <= 0 {
        return Err(ConfigError::InvalidRowsPerPage(rows).into());
    }
    Ok(rows)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordResponse {
    pub upgraded: bool,
    pub outcome: PasswordUpgrade,
}

/// POST /convert/password
///
/// Lazy upgrade of a converted user's legacy password on first login.
pub async fn upgrade_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordRequest>,
) -> ApiResult<Json<PasswordResponse>> {
    if request.login.trim().is_empty() {
        return Err(ApiError::BadRequest("login is required".to_string()));
    }

    let store = SqliteDestination::new(state.db.clone(), state.lookup_table);
    let outcome =
        passwords::upgrade_password(&store, &state.registry, &request.login, &request.password)
            .await?;

    if outcome == PasswordUpgrade::Rejected {
        warn!(login = %request.login, "Legacy password rejected");
    }

    Ok(Json(PasswordResponse {
        upgraded: outcome.upgraded(),
        outcome,
    }))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub state: StepState,
    pub step_name: Option<Step>,
    pub lookup_table: bool,
    /// Whether a page is being processed right now
    pub running: bool,
}

/// GET /convert/status
pub async fn conversion_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let step_state = SettingsStepStore::new(state.db.clone()).load().await?;
    let running = state.run_lease.try_lock().is_err();

    Ok(Json(StatusResponse {
        step_name: Step::from_number(step_state.step),
        state: step_state,
        lookup_table: state.lookup_table,
        running,
    }))
}

/// GET /convert/platforms
pub async fn list_platforms(State(state): State<AppState>) -> Json<Vec<PlatformInfo>> {
    Json(state.registry.platforms())
}
