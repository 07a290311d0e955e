//! Read-only connection to a legacy database

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::path::Path;
use tracing::debug;

use super::SourceError;
use crate::convert::query::PageQuery;
use crate::convert::value::SourceRow;

/// Connection parameters sent with every conversion request
///
/// SQLite sources use `name` as the database file path; `server`, `port`,
/// `user` and `password` are accepted for client compatibility and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConnection {
    pub server: String,
    pub port: Option<u16>,
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub table_prefix: String,
}

impl SourceConnection {
    pub fn sqlite(path: impl Into<String>, table_prefix: impl Into<String>) -> Self {
        Self {
            name: path.into(),
            table_prefix: table_prefix.into(),
            ..Self::default()
        }
    }
}

/// Read-only pool over the legacy database
#[derive(Debug, Clone)]
pub struct SourceDb {
    pool: SqlitePool,
}

impl SourceDb {
    /// Open the legacy database read-only
    ///
    /// `mode=ro` rejects writes; `immutable=1` also stops SQLite from writing
    /// journal or lock state next to the legacy file.
    pub async fn connect(connection: &SourceConnection) -> Result<Self, SourceError> {
        let path = Path::new(&connection.name);
        let db_url = format!("sqlite://{}?mode=ro&immutable=1", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await
            .map_err(|source| SourceError::Connect {
                path: connection.name.clone(),
                source,
            })?;

        debug!("Opened legacy database (read-only): {}", path.display());
        Ok(Self { pool })
    }

    /// Run a page query and return rows keyed by column name
    pub async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<SourceRow>, SourceError> {
        let rows = sqlx::query(&query.sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|source| SourceError::Query {
                sql: query.sql.clone(),
                source,
            })?;

        rows.iter()
            .map(row_to_source)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SourceError::Query {
                sql: query.sql.clone(),
                source,
            })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decode each column by the storage class of its value
fn row_to_source(row: &SqliteRow) -> Result<SourceRow, sqlx::Error> {
    let mut out = SourceRow::new();

    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" => Value::from(row.try_get::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(idx)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
            }
        };

        out.insert(column.name().to_string(), value);
    }

    Ok(out)
}
