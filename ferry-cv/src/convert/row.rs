//! Row conversion
//!
//! Turns one raw source row into the core fields and metadata of one
//! destination object, applying each field map entry for the kind in order.

use serde_json::Value;

use super::entity::EntityKind;
use super::error::ConvertError;
use super::field_map::{FieldMap, FieldRule, Transform};
use super::id_cache::IdCache;
use super::transforms;
use super::value::{ConvertedRow, SourceRow};
use crate::source::SourceAdapter;

pub struct RowConverter<'a> {
    map: &'a FieldMap,
    adapter: &'a dyn SourceAdapter,
    convert_users: bool,
}

impl<'a> RowConverter<'a> {
    pub fn new(adapter: &'a dyn SourceAdapter, convert_users: bool) -> Self {
        Self {
            map: adapter.field_map(),
            adapter,
            convert_users,
        }
    }

    pub async fn convert(
        &self,
        kind: EntityKind,
        row: &SourceRow,
        cache: &mut IdCache<'_>,
    ) -> Result<ConvertedRow, ConvertError> {
        let mut out = ConvertedRow::default();

        for entry in self.map.entries_for(kind) {
            let raw = entry
                .source
                .and_then(|s| row.get(s.field))
                .cloned()
                .unwrap_or(Value::Null);

            let value = match &entry.rule {
                FieldRule::Default(value) => value.clone(),
                FieldRule::Transform(transform) => self.apply(kind, *transform, &raw, row, cache).await?,
                FieldRule::Direct => raw,
            };

            let target = if kind.is_core_field(entry.to_field) {
                &mut out.core
            } else {
                &mut out.meta
            };
            target.insert(entry.to_field.to_string(), value);
        }

        Ok(out)
    }

    async fn apply(
        &self,
        kind: EntityKind,
        transform: Transform,
        value: &Value,
        row: &SourceRow,
        cache: &mut IdCache<'_>,
    ) -> Result<Value, ConvertError> {
        let converted = match transform {
            Transform::PeriodId => Value::from(cache.resolve(EntityKind::Period, value).await?),
            Transform::AccountId => Value::from(cache.resolve(EntityKind::Account, value).await?),
            Transform::UserId if !self.convert_users => value.clone(),
            Transform::UserId => Value::from(cache.resolve(EntityKind::User, value).await?),
            Transform::AccountToPeriod => Value::from(cache.account_to_period(value).await?),
            Transform::Datetime => transforms::datetime(value),
            Transform::Slug => transforms::slug(value),
            Transform::Html => transforms::html(value),
            Transform::NonZero => transforms::non_zero(value),
            Transform::Custom(name) => self
                .adapter
                .transform(name, value, row)
                .ok_or(ConvertError::UnknownTransform { kind, name })?,
        };
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::field_map::FieldMapEntry;
    use crate::destination::SqliteDestination;
    use crate::source::PlatformInfo;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    struct TestAdapter {
        map: FieldMap,
    }

    impl SourceAdapter for TestAdapter {
        fn info(&self) -> PlatformInfo {
            PlatformInfo {
                name: "test",
                label: "Test",
                description: "In-memory test platform",
                password_scheme: "none",
            }
        }

        fn field_map(&self) -> &FieldMap {
            &self.map
        }

        fn authenticate_password(&self, _plain: &str, _hash: &str) -> bool {
            false
        }
    }

    fn adapter(entries: Vec<FieldMapEntry>) -> TestAdapter {
        TestAdapter {
            map: FieldMap::new(entries),
        }
    }

    async fn empty_destination() -> SqliteDestination {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        ferry_common::db::create_schema(&pool).await.unwrap();
        SqliteDestination::new(pool, false)
    }

    fn topic_row() -> SourceRow {
        let mut row = SourceRow::new();
        row.insert("topic_id".to_string(), json!(7));
        row.insert("forum_id".to_string(), json!(3));
        row.insert("topic_title".to_string(), json!("Hello World"));
        row.insert("poster_id".to_string(), json!(42));
        row
    }

    #[tokio::test]
    async fn test_core_and_meta_split() {
        let adapter = adapter(vec![
            FieldMapEntry::direct(EntityKind::Account, "_ferry_legacy_account_id", "topics", "topic_id"),
            FieldMapEntry::direct(EntityKind::Account, "title", "topics", "topic_title"),
            FieldMapEntry::transformed(EntityKind::Account, "slug", "topics", "topic_title", Transform::Slug),
            FieldMapEntry::transformed(EntityKind::Account, "parent_id", "topics", "forum_id", Transform::PeriodId),
            FieldMapEntry::transformed(EntityKind::Account, "author_id", "topics", "poster_id", Transform::UserId),
            FieldMapEntry::fixed(EntityKind::Account, "status", "publish"),
        ]);
        let store = empty_destination().await;
        let mut cache = IdCache::new(&store);

        let converted = RowConverter::new(&adapter, false)
            .convert(EntityKind::Account, &topic_row(), &mut cache)
            .await
            .unwrap();

        assert_eq!(converted.core["title"], json!("Hello World"));
        assert_eq!(converted.core["slug"], json!("hello-world"));
        assert_eq!(converted.core["status"], json!("publish"));
        // Unknown period resolves to 0; users not converted keep the raw id
        assert_eq!(converted.core["parent_id"], json!(0));
        assert_eq!(converted.core["author_id"], json!(42));
        assert_eq!(converted.meta.len(), 1);
        assert_eq!(converted.meta["_ferry_legacy_account_id"], json!(7));
    }

    #[tokio::test]
    async fn test_missing_column_is_null() {
        let adapter = adapter(vec![FieldMapEntry::direct(
            EntityKind::Account,
            "_ferry_legacy_topic_views",
            "topics",
            "topic_views",
        )]);
        let store = empty_destination().await;
        let mut cache = IdCache::new(&store);

        let converted = RowConverter::new(&adapter, true)
            .convert(EntityKind::Account, &topic_row(), &mut cache)
            .await
            .unwrap();
        assert_eq!(converted.meta["_ferry_legacy_topic_views"], Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_custom_transform() {
        let adapter = adapter(vec![FieldMapEntry::transformed(
            EntityKind::Account,
            "title",
            "topics",
            "topic_title",
            Transform::Custom("shout"),
        )]);
        let store = empty_destination().await;
        let mut cache = IdCache::new(&store);

        let result = RowConverter::new(&adapter, true)
            .convert(EntityKind::Account, &topic_row(), &mut cache)
            .await;
        assert!(matches!(
            result,
            Err(ConvertError::UnknownTransform { name: "shout", .. })
        ));
    }
}
