//! Conversion engine errors

use thiserror::Error;

use super::entity::EntityKind;
use super::field_map::FieldMapError;
use super::query::QueryError;
use crate::source::SourceError;

/// Invalid request or adapter configuration; no work is performed
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown source platform: {0}")]
    UnknownPlatform(String),

    #[error("unsupported action: {0:?}")]
    UnsupportedAction(String),

    #[error("source connection has no database name")]
    MissingDatabaseName,

    #[error("rows per page must be positive, got {0}")]
    InvalidRowsPerPage(i64),

    #[error("invalid table prefix: {0:?}")]
    InvalidTablePrefix(String),

    #[error("field map for {platform} is invalid: {source}")]
    InvalidFieldMap {
        platform: String,
        #[source]
        source: FieldMapError,
    },

    #[error("legacy database unavailable: {0}")]
    SourceUnavailable(#[source] SourceError),
}

/// Failure converting or writing one row, or running one page
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("destination: {0}")]
    Destination(#[from] ferry_common::Error),

    #[error("unknown transform {name} for {kind}")]
    UnknownTransform { kind: EntityKind, name: &'static str },

    #[error("stored conversion step {0} is invalid, restart the conversion")]
    InvalidStep(u8),
}

impl ConvertError {
    /// Source failures are retried on the next invocation rather than reported as fatal
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConvertError::Source(_))
    }

    /// Legacy statement that failed, when the error came from a source query
    pub fn failed_query(&self) -> Option<&str> {
        match self {
            ConvertError::Source(e) => e.query(),
            _ => None,
        }
    }
}
