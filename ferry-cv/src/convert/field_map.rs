//! Declarative field mapping
//!
//! Each [`FieldMapEntry`] attaches one destination field of one entity kind
//! to an optional source column. How the value is produced is a tagged
//! [`FieldRule`], so exactly one of default / transform / direct copy applies.

use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

use super::entity::EntityKind;

/// Callback applied to a source value before it is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Legacy period id to new period id
    PeriodId,
    /// Legacy account id to new account id
    AccountId,
    /// Legacy user id to new user id; raw passthrough when users are not converted
    UserId,
    /// Legacy account id to the new period that account sits under
    AccountToPeriod,
    /// Unix seconds or a date string to `YYYY-MM-DD HH:MM:SS`
    Datetime,
    /// Lowercase, dash-separated slug
    Slug,
    /// Normalize line endings and strip surrounding whitespace
    Html,
    /// Replace zero or blank with NULL
    NonZero,
    /// Platform-specific callback implemented by the source adapter
    Custom(&'static str),
}

/// Value resolution for one entry, in priority order
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRule {
    Default(Value),
    Transform(Transform),
    Direct,
}

/// Source column reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceField {
    pub table: &'static str,
    pub field: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub const fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// How an entry's source table joins the base table of its kind
///
/// The join is `joined.joined_field = base.base_field`, narrowed by `on` when
/// set. `on` only applies to the entry that introduces the join, and it is the
/// place for predicates on the optional side of a LEFT JOIN. `{prefix}` in
/// `on` is replaced by the table prefix so it can hold a subquery. `condition` is an
/// extra WHERE predicate; when the table is already joined by an earlier
/// entry only the condition is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec {
    pub join_type: JoinType,
    pub base_field: &'static str,
    pub joined_field: &'static str,
    pub on: Option<&'static str>,
    pub condition: Option<&'static str>,
}

impl JoinSpec {
    pub const fn inner(base_field: &'static str, joined_field: &'static str) -> Self {
        Self {
            join_type: JoinType::Inner,
            base_field,
            joined_field,
            on: None,
            condition: None,
        }
    }

    pub const fn left(base_field: &'static str, joined_field: &'static str) -> Self {
        Self {
            join_type: JoinType::Left,
            base_field,
            joined_field,
            on: None,
            condition: None,
        }
    }

    pub const fn with_on(mut self, on: &'static str) -> Self {
        self.on = Some(on);
        self
    }

    pub const fn with_condition(mut self, condition: &'static str) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// One mapping rule
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapEntry {
    pub to_kind: EntityKind,
    pub to_field: &'static str,
    pub source: Option<SourceField>,
    pub rule: FieldRule,
    pub join: Option<JoinSpec>,
    /// WHERE predicate restricting which source rows are converted
    pub filter: Option<&'static str>,
}

impl FieldMapEntry {
    /// Copy `table.field` unchanged
    pub fn direct(
        to_kind: EntityKind,
        to_field: &'static str,
        table: &'static str,
        field: &'static str,
    ) -> Self {
        Self {
            to_kind,
            to_field,
            source: Some(SourceField { table, field }),
            rule: FieldRule::Direct,
            join: None,
            filter: None,
        }
    }

    /// Pass `table.field` through `transform`
    pub fn transformed(
        to_kind: EntityKind,
        to_field: &'static str,
        table: &'static str,
        field: &'static str,
        transform: Transform,
    ) -> Self {
        Self {
            rule: FieldRule::Transform(transform),
            ..Self::direct(to_kind, to_field, table, field)
        }
    }

    /// Constant value, no source column
    pub fn fixed(to_kind: EntityKind, to_field: &'static str, value: impl Into<Value>) -> Self {
        Self {
            to_kind,
            to_field,
            source: None,
            rule: FieldRule::Default(value.into()),
            join: None,
            filter: None,
        }
    }

    pub fn joined(mut self, join: JoinSpec) -> Self {
        self.join = Some(join);
        self
    }

    pub fn filtered(mut self, filter: &'static str) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FieldMapError {
    #[error("{kind}.{field}: rule needs a source column")]
    MissingSource { kind: EntityKind, field: &'static str },

    #[error("{kind}: table {table} is referenced but never joined")]
    UnjoinedTable { kind: EntityKind, table: &'static str },

    #[error("{kind}: base table {table} cannot carry a join")]
    JoinOnBaseTable { kind: EntityKind, table: &'static str },
}

/// The complete rule set for one legacy platform
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    entries: Vec<FieldMapEntry>,
}

impl FieldMap {
    pub fn new(entries: Vec<FieldMapEntry>) -> Self {
        Self { entries }
    }

    pub fn entries_for(&self, kind: EntityKind) -> impl Iterator<Item = &FieldMapEntry> {
        self.entries.iter().filter(move |e| e.to_kind == kind)
    }

    pub fn has_kind(&self, kind: EntityKind) -> bool {
        self.entries_for(kind).next().is_some()
    }

    /// First source table mapped for `kind`; the page query selects FROM it
    pub fn base_table(&self, kind: EntityKind) -> Option<&'static str> {
        self.entries_for(kind)
            .find_map(|e| e.source.filter(|_| e.join.is_none()).map(|s| s.table))
    }

    /// Check the structural rules the query builder relies on
    pub fn validate(&self) -> Result<(), FieldMapError> {
        for kind in EntityKind::ALL {
            let base = self.base_table(kind);
            let mut joined = BTreeSet::new();

            for entry in self.entries_for(kind) {
                if entry.source.is_none() && !matches!(entry.rule, FieldRule::Default(_)) {
                    return Err(FieldMapError::MissingSource {
                        kind,
                        field: entry.to_field,
                    });
                }
                if let (Some(source), Some(_)) = (entry.source, entry.join) {
                    if Some(source.table) == base {
                        return Err(FieldMapError::JoinOnBaseTable {
                            kind,
                            table: source.table,
                        });
                    }
                    joined.insert(source.table);
                }
            }

            for entry in self.entries_for(kind) {
                if let Some(source) = entry.source {
                    if Some(source.table) != base && !joined.contains(source.table) {
                        return Err(FieldMapError::UnjoinedTable {
                            kind,
                            table: source.table,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_table_is_first_unjoined_source() {
        let map = FieldMap::new(vec![
            FieldMapEntry::fixed(EntityKind::Account, "status", "publish"),
            FieldMapEntry::direct(EntityKind::Account, "title", "topics", "topic_title"),
            FieldMapEntry::direct(EntityKind::Account, "content", "posts", "post_text")
                .joined(JoinSpec::inner("topic_id", "topic_id")),
        ]);
        assert_eq!(map.base_table(EntityKind::Account), Some("topics"));
        assert_eq!(map.base_table(EntityKind::Period), None);
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unjoined_table() {
        let map = FieldMap::new(vec![
            FieldMapEntry::direct(EntityKind::Account, "title", "topics", "topic_title"),
            FieldMapEntry::direct(EntityKind::Account, "content", "posts", "post_text"),
        ]);
        assert_eq!(
            map.validate(),
            Err(FieldMapError::UnjoinedTable {
                kind: EntityKind::Account,
                table: "posts"
            })
        );
    }

    #[test]
    fn test_validate_rejects_direct_without_source() {
        let mut entry = FieldMapEntry::fixed(EntityKind::Period, "title", "x");
        entry.rule = FieldRule::Direct;
        let map = FieldMap::new(vec![entry]);
        assert!(matches!(
            map.validate(),
            Err(FieldMapError::MissingSource { .. })
        ));
    }
}
