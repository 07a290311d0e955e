//! Page query construction from the field map
//!
//! Selects every distinct source column mapped for one entity kind. Tables
//! other than the base table are joined once; later entries referencing an
//! already-joined table only contribute their condition to WHERE.

use std::collections::BTreeSet;
use thiserror::Error;

use super::entity::EntityKind;
use super::field_map::{FieldMap, JoinSpec, SourceField};

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("no source table is mapped for {0}")]
    NoSource(EntityKind),

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("table {table} is used by {kind} but never joined")]
    UnjoinedTable { kind: EntityKind, table: String },
}

/// A built page query
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub sql: String,
    /// Column names as they appear in result rows
    pub columns: Vec<&'static str>,
}

/// Accepts `[A-Za-z0-9_]` only; the table prefix arrives with the request
pub fn validate_identifier(ident: &str) -> Result<(), QueryError> {
    if ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(ident.to_string()))
    }
}

struct QueryBuilder<'a> {
    prefix: &'a str,
    base: &'static str,
    columns: Vec<&'static str>,
    selects: Vec<String>,
    joins: Vec<String>,
    joined: BTreeSet<&'static str>,
    conditions: Vec<String>,
}

impl<'a> QueryBuilder<'a> {
    fn new(prefix: &'a str, base: &'static str) -> Self {
        Self {
            prefix,
            base,
            columns: Vec::new(),
            selects: Vec::new(),
            joins: Vec::new(),
            joined: BTreeSet::new(),
            conditions: Vec::new(),
        }
    }

    fn select(&mut self, source: SourceField) -> Result<(), QueryError> {
        validate_identifier(source.table)?;
        validate_identifier(source.field)?;
        // Result rows are keyed by bare column name; first mapping wins
        if self.columns.contains(&source.field) {
            return Ok(());
        }
        self.columns.push(source.field);
        self.selects
            .push(format!("\"{}\".\"{}\" AS \"{}\"", source.table, source.field, source.field));
        Ok(())
    }

    fn join(&mut self, table: &'static str, spec: &JoinSpec) -> Result<(), QueryError> {
        if self.joined.insert(table) {
            validate_identifier(spec.base_field)?;
            validate_identifier(spec.joined_field)?;
            let mut join = format!(
                "{} \"{}{}\" AS \"{}\" ON \"{}\".\"{}\" = \"{}\".\"{}\"",
                spec.join_type.as_sql(),
                self.prefix,
                table,
                table,
                table,
                spec.joined_field,
                self.base,
                spec.base_field
            );
            if let Some(on) = spec.on {
                join.push_str(&format!(" AND ({})", on.replace("{prefix}", self.prefix)));
            }
            self.joins.push(join);
        }
        if let Some(condition) = spec.condition {
            self.condition(condition);
        }
        Ok(())
    }

    fn condition(&mut self, condition: &str) {
        let condition = format!("({})", condition);
        if !self.conditions.contains(&condition) {
            self.conditions.push(condition);
        }
    }

    fn build(self, order_field: &str, offset: i64, limit: i64) -> PageQuery {
        let mut sql = format!(
            "SELECT {} FROM \"{}{}\" AS \"{}\"",
            self.selects.join(", "),
            self.prefix,
            self.base,
            self.base
        );
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY \"{}\".\"{}\", \"{}\".rowid LIMIT {} OFFSET {}",
            self.base,
            order_field,
            self.base,
            limit.max(0),
            offset.max(0)
        ));

        PageQuery {
            sql,
            columns: self.columns,
        }
    }
}

/// Build the query fetching one page of source rows for `kind`
///
/// Rows are ordered by the first base-table column mapped for the kind
/// (the legacy id by convention), then rowid, so consecutive pages never
/// overlap.
pub fn build_page_query(
    map: &FieldMap,
    kind: EntityKind,
    table_prefix: &str,
    offset: i64,
    limit: i64,
) -> Result<PageQuery, QueryError> {
    validate_identifier(table_prefix)?;
    let base = map.base_table(kind).ok_or(QueryError::NoSource(kind))?;
    validate_identifier(base)?;

    let mut builder = QueryBuilder::new(table_prefix, base);
    let mut order_field = None;

    for entry in map.entries_for(kind) {
        let Some(source) = entry.source else {
            continue;
        };

        if source.table == base {
            order_field.get_or_insert(source.field);
        } else if let Some(join) = &entry.join {
            builder.join(source.table, join)?;
        } else if !builder.joined.contains(source.table) {
            return Err(QueryError::UnjoinedTable {
                kind,
                table: source.table.to_string(),
            });
        }

        builder.select(source)?;

        if let Some(filter) = entry.filter {
            builder.condition(filter);
        }
    }

    let order_field = order_field.ok_or(QueryError::NoSource(kind))?;
    Ok(builder.build(order_field, offset, limit))
}
