//! Request authentication via timestamp and hash validation
//!
//! Every protected request body carries `timestamp` (Unix epoch ms) and
//! `hash` (SHA-256, 64 hex chars). The hash covers the canonical JSON body
//! with `hash` replaced by 64 zeros, followed by the shared secret in decimal.
//! A shared secret of 0 disables checking entirely.
//!
//! No HTTP framework types live here; the middleware is service-specific.

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[cfg(feature = "sqlx")]
use crate::db::{get_setting, set_setting};
#[cfg(feature = "sqlx")]
use sqlx::SqlitePool;

/// Settings key holding the shared secret
pub const SHARED_SECRET_KEY: &str = "api_shared_secret";

/// Maximum accepted age of a request timestamp
pub const MAX_PAST_MS: i64 = 1000;

/// Maximum accepted clock skew into the future
pub const MAX_FUTURE_MS: i64 = 1;

const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Request authentication failure
#[derive(Debug, Clone, Error)]
pub enum ApiAuthError {
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        timestamp: i64,
        now: i64,
        reason: String,
    },

    #[error("Invalid hash")]
    InvalidHash { provided: String, calculated: String },

    /// Body lacks a numeric `timestamp` or a string `hash`
    #[error("Missing auth fields: {0}")]
    MissingFields(String),

    /// Shared secret could not be read or stored
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[cfg(feature = "sqlx")]
impl From<crate::Error> for ApiAuthError {
    fn from(err: crate::Error) -> Self {
        ApiAuthError::DatabaseError(err.to_string())
    }
}

// ========================================
// Shared Secret Management
// ========================================

/// Load the shared secret, generating one on first use
#[cfg(feature = "sqlx")]
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    match get_setting::<i64>(db, SHARED_SECRET_KEY).await? {
        Some(secret) => Ok(secret),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate and store a random non-zero shared secret
#[cfg(feature = "sqlx")]
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let secret = rand::thread_rng().gen_range(1..=i64::MAX);
    set_setting(db, SHARED_SECRET_KEY, secret).await?;

    tracing::info!("Generated new API shared secret");
    Ok(secret)
}

// ========================================
// Timestamp Validation
// ========================================

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Validate that `timestamp` lies inside the accepted window
///
/// The window is asymmetric: requests may be up to one second old (processing
/// delay) but only 1ms in the future (clock drift).
///
/// ```
/// use ferry_common::api::auth::validate_timestamp;
/// use std::time::{SystemTime, UNIX_EPOCH};
///
/// let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64;
/// assert!(validate_timestamp(now - 500).is_ok());
/// assert!(validate_timestamp(now - 2000).is_err());
/// ```
pub fn validate_timestamp(timestamp: i64) -> Result<(), ApiAuthError> {
    let now = now_ms();
    let diff = now - timestamp;

    if diff > MAX_PAST_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms too old (max {}ms past)", diff, MAX_PAST_MS),
        });
    }

    if diff < -MAX_FUTURE_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!(
                "Timestamp {}ms in future (max {}ms future)",
                diff.abs(),
                MAX_FUTURE_MS
            ),
        });
    }

    Ok(())
}

// ========================================
// Hash Calculation and Validation
// ========================================

/// Calculate the request hash for `json_value` under `shared_secret`
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(ZERO_HASH.to_string()));
    }

    let to_hash = format!("{}{}", to_canonical_json(&value), shared_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// ```
/// use ferry_common::api::auth::to_canonical_json;
/// use serde_json::json;
///
/// let canonical = to_canonical_json(&json!({"z": 3, "a": {"y": 1, "b": 2}}));
/// assert_eq!(canonical, r#"{"a":{"b":2,"y":1},"z":3}"#);
/// ```
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("\"{}\":{}", k, to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Validate that `provided_hash` matches the calculated hash
pub fn validate_hash(
    provided_hash: &str,
    json_value: &Value,
    shared_secret: i64,
) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);

    if provided_hash != calculated {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct AuthFields {
    timestamp: i64,
    hash: String,
}

/// Check the `timestamp` and `hash` carried by a request body
pub fn authenticate_body(body: &Value, shared_secret: i64) -> Result<(), ApiAuthError> {
    let fields = AuthFields::deserialize(body).map_err(|e| ApiAuthError::MissingFields(e.to_string()))?;
    validate_timestamp(fields.timestamp)?;
    validate_hash(&fields.hash, body, shared_secret)
}

/// Stamp `body` with the current timestamp and a valid hash
///
/// Used by clients (and tests) that drive the converter.
pub fn sign_request(body: &mut Value, shared_secret: i64) {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("timestamp".to_string(), Value::from(now_ms()));
    }
    let hash = calculate_hash(body, shared_secret);
    if let Some(obj) = body.as_object_mut() {
        obj.insert("hash".to_string(), Value::String(hash));
    }
}
