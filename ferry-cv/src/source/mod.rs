//! Legacy source access
//!
//! A [`SourceAdapter`] describes one legacy platform: its field map and the
//! callbacks that only make sense for that platform (password scheme, custom
//! transforms). The rows themselves come through a read-only [`SourceDb`].

pub mod classic;
pub mod connection;
pub mod registry;

pub use connection::{SourceConnection, SourceDb};
pub use registry::{AdapterFactory, AdapterRegistry};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::convert::field_map::FieldMap;
use crate::convert::value::SourceRow;

/// Descriptive metadata an adapter publishes about its platform
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Registry identifier used in conversion requests
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    /// Legacy password scheme verified on first login
    pub password_scheme: &'static str,
}

/// Source query or connection failure
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open legacy database {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("legacy query failed: {source}")]
    Query {
        sql: String,
        #[source]
        source: sqlx::Error,
    },
}

impl SourceError {
    /// The failing statement, when the failure came from a query
    pub fn query(&self) -> Option<&str> {
        match self {
            SourceError::Query { sql, .. } => Some(sql),
            SourceError::Connect { .. } => None,
        }
    }
}

/// One supported legacy platform
pub trait SourceAdapter: Send + Sync {
    fn info(&self) -> PlatformInfo;

    /// Declarative mapping from the legacy schema to destination entities
    fn field_map(&self) -> &FieldMap;

    /// Check `plain` against a legacy hash as written by this platform
    fn authenticate_password(&self, plain: &str, hash: &str) -> bool;

    /// Platform-specific transform callback; `None` when `name` is unknown
    fn transform(&self, name: &str, value: &Value, row: &SourceRow) -> Option<Value> {
        let _ = (name, value, row);
        None
    }
}
