//! SQLite destination store

use async_trait::async_trait;
use ferry_common::db::ID_MAP_TABLE;
use ferry_common::{Error, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::{DestinationStore, IdMapping};
use crate::convert::entity::{
    is_legacy_link, EntityKind, ObjectKind, META_PREFIX, TAG_ACCOUNT_FIELD, TAG_NAME_FIELD,
    TAG_SLUG_FIELD, TAG_TAXONOMY,
};
use crate::convert::value::{legacy_key_string, meta_text, value_as_i64, ConvertedRow, FieldValues};

#[derive(Debug, Clone)]
pub struct SqliteDestination {
    pool: SqlitePool,
    lookup_table: bool,
}

impl SqliteDestination {
    /// `lookup_table` must only be set when the id map table exists
    pub fn new(pool: SqlitePool, lookup_table: bool) -> Self {
        Self { pool, lookup_table }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Indexed lookup through the id map table
    pub async fn find_in_lookup_table(&self, kind: EntityKind, legacy_value: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar(&format!(
            "SELECT new_id FROM {} WHERE entity_kind = ? AND legacy_key = ? AND legacy_value = ? \
             ORDER BY id LIMIT 1",
            ID_MAP_TABLE
        ))
        .bind(kind.as_str())
        .bind(kind.legacy_id_key())
        .bind(legacy_value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Fallback lookup scanning object metadata
    pub async fn find_by_meta_scan(&self, kind: EntityKind, legacy_value: &str) -> Result<Option<i64>> {
        let object = kind.object_kind();
        let id: Option<i64> = match object {
            ObjectKind::Entity => {
                sqlx::query_scalar(
                    "SELECT m.object_id FROM meta m JOIN entities e ON e.id = m.object_id \
                     WHERE m.object_kind = 'entity' AND e.kind = ? AND m.meta_key = ? AND m.meta_value = ? \
                     ORDER BY m.object_id LIMIT 1",
                )
                .bind(kind.as_str())
                .bind(kind.legacy_id_key())
                .bind(legacy_value)
                .fetch_optional(&self.pool)
                .await?
            }
            ObjectKind::User | ObjectKind::Term => {
                sqlx::query_scalar(
                    "SELECT object_id FROM meta WHERE object_kind = ? AND meta_key = ? AND meta_value = ? \
                     ORDER BY object_id LIMIT 1",
                )
                .bind(object.as_str())
                .bind(kind.legacy_id_key())
                .bind(legacy_value)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(id)
    }

    /// Metadata rows plus id links for a freshly created object
    async fn write_meta(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        kind: EntityKind,
        id: i64,
        meta: &FieldValues,
    ) -> Result<()> {
        let object = kind.object_kind();

        for (key, value) in meta {
            // Legacy links are stored in the same form the lookup table and resolvers use
            let stored = if is_legacy_link(key) {
                legacy_key_string(value)
            } else {
                meta_text(value)
            };
            let Some(text) = stored else {
                continue;
            };
            sqlx::query("INSERT INTO meta (object_kind, object_id, meta_key, meta_value) VALUES (?, ?, ?, ?)")
                .bind(object.as_str())
                .bind(id)
                .bind(key)
                .bind(&text)
                .execute(&mut **tx)
                .await?;
        }

        if self.lookup_table {
            for mapping in legacy_links(kind, id, meta) {
                sqlx::query(&format!(
                    "INSERT INTO {} (entity_kind, new_id, legacy_key, legacy_value) VALUES (?, ?, ?, ?)",
                    ID_MAP_TABLE
                ))
                .bind(mapping.entity_kind.as_str())
                .bind(mapping.new_id)
                .bind(&mapping.legacy_key)
                .bind(&mapping.legacy_value)
                .execute(&mut **tx)
                .await?;
            }
        }

        Ok(())
    }
}

/// Id mappings implied by an object's metadata
pub fn legacy_links(kind: EntityKind, new_id: i64, meta: &FieldValues) -> Vec<IdMapping> {
    meta.iter()
        .filter(|(key, _)| is_legacy_link(key))
        .filter_map(|(key, value)| {
            legacy_key_string(value).map(|legacy_value| IdMapping {
                entity_kind: kind,
                new_id,
                legacy_key: key.clone(),
                legacy_value,
            })
        })
        .collect()
}

fn text(core: &FieldValues, key: &str) -> String {
    core.get(key).and_then(meta_text).unwrap_or_default()
}

fn opt_text(core: &FieldValues, key: &str) -> Option<String> {
    core.get(key).and_then(meta_text).filter(|s| !s.is_empty())
}

fn int(core: &FieldValues, key: &str) -> i64 {
    core.get(key).and_then(value_as_i64).unwrap_or(0)
}

fn escape_like(prefix: &str) -> String {
    let mut escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    escaped.push('%');
    escaped
}

#[async_trait]
impl DestinationStore for SqliteDestination {
    async fn insert_entity(&self, kind: EntityKind, row: &ConvertedRow) -> Result<i64> {
        if kind.object_kind() != ObjectKind::Entity {
            return Err(Error::InvalidInput(format!("{} is not an entity kind", kind)));
        }
        let core = &row.core;
        let status = opt_text(core, "status").unwrap_or_else(|| "publish".to_string());

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO entities
                (kind, parent_id, author_id, title, content, slug, status, created_at, updated_at, menu_order)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(kind.as_str())
        .bind(int(core, "parent_id"))
        .bind(int(core, "author_id"))
        .bind(text(core, "title"))
        .bind(text(core, "content"))
        .bind(text(core, "slug"))
        .bind(status)
        .bind(opt_text(core, "created_at"))
        .bind(opt_text(core, "updated_at").or_else(|| opt_text(core, "created_at")))
        .bind(int(core, "menu_order"))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        self.write_meta(&mut tx, kind, id, &row.meta).await?;
        tx.commit().await?;

        debug!(kind = %kind, id, "Inserted entity");
        Ok(id)
    }

    async fn insert_user(&self, row: &ConvertedRow) -> Result<i64> {
        let core = &row.core;
        let login = opt_text(core, "login")
            .ok_or_else(|| Error::InvalidInput("user row has no login".to_string()))?;

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO users
                (login, password_hash, nicename, email, url, display_name, status, registered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&login)
        .bind(text(core, "password_hash"))
        .bind(text(core, "nicename"))
        .bind(text(core, "email"))
        .bind(text(core, "url"))
        .bind(opt_text(core, "display_name").unwrap_or_else(|| login.clone()))
        .bind(int(core, "status"))
        .bind(opt_text(core, "registered_at"))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        self.write_meta(&mut tx, EntityKind::User, id, &row.meta).await?;
        tx.commit().await?;

        debug!(id, login = %login, "Inserted user");
        Ok(id)
    }

    async fn attach_tag(&self, account_id: i64, row: &ConvertedRow) -> Result<i64> {
        if account_id <= 0 {
            return Err(Error::InvalidInput("tag row has no converted account".to_string()));
        }
        let name = opt_text(&row.meta, TAG_NAME_FIELD)
            .ok_or_else(|| Error::InvalidInput("tag row has no name".to_string()))?;
        let slug = opt_text(&row.meta, TAG_SLUG_FIELD).unwrap_or_else(|| name.to_lowercase());

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO terms (taxonomy, name, slug) VALUES (?, ?, ?) ON CONFLICT(taxonomy, slug) DO NOTHING",
        )
        .bind(TAG_TAXONOMY)
        .bind(&name)
        .bind(&slug)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        let created = inserted > 0;

        let term_id: i64 = sqlx::query_scalar("SELECT id FROM terms WHERE taxonomy = ? AND slug = ?")
            .bind(TAG_TAXONOMY)
            .bind(&slug)
            .fetch_one(&mut *tx)
            .await?;

        if created {
            let meta: FieldValues = row
                .meta
                .iter()
                .filter(|(key, _)| ![TAG_ACCOUNT_FIELD, TAG_NAME_FIELD, TAG_SLUG_FIELD].contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            self.write_meta(&mut tx, EntityKind::Tag, term_id, &meta).await?;
        }

        sqlx::query("INSERT OR IGNORE INTO term_relationships (entity_id, term_id) VALUES (?, ?)")
            .bind(account_id)
            .bind(term_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(term_id)
    }

    async fn find_legacy(&self, kind: EntityKind, legacy_value: &str) -> Result<Option<i64>> {
        if self.lookup_table {
            self.find_in_lookup_table(kind, legacy_value).await
        } else {
            self.find_by_meta_scan(kind, legacy_value).await
        }
    }

    async fn parent_of(&self, entity_id: i64) -> Result<Option<i64>> {
        let parent = sqlx::query_scalar("SELECT parent_id FROM entities WHERE id = ?")
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(parent)
    }

    async fn set_parent(&self, entity_id: i64, parent_id: i64) -> Result<()> {
        sqlx::query("UPDATE entities SET parent_id = ? WHERE id = ?")
            .bind(parent_id)
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn objects_with_meta(
        &self,
        object: ObjectKind,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query_as(
            "SELECT object_id, meta_value FROM meta \
             WHERE object_kind = ? AND meta_key = ? AND meta_value IS NOT NULL AND meta_value NOT IN ('', '0') \
             ORDER BY object_id LIMIT ? OFFSET ?",
        )
        .bind(object.as_str())
        .bind(key)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn imported_objects(&self, object: ObjectKind, limit: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT DISTINCT object_id FROM meta WHERE object_kind = ? AND meta_key LIKE ? ESCAPE '\\' \
             ORDER BY object_id DESC LIMIT ?",
        )
        .bind(object.as_str())
        .bind(escape_like(META_PREFIX))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn delete_object(&self, object: ObjectKind, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let (table, link_kinds): (&str, &[&str]) = match object {
            ObjectKind::Entity => ("entities", &["period", "account", "record"]),
            ObjectKind::User => ("users", &["user"]),
            ObjectKind::Term => ("terms", &["tag"]),
        };

        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM meta WHERE object_kind = ? AND object_id = ?")
            .bind(object.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let relationship_column = match object {
            ObjectKind::Entity => Some("entity_id"),
            ObjectKind::Term => Some("term_id"),
            ObjectKind::User => None,
        };
        if let Some(column) = relationship_column {
            sqlx::query(&format!("DELETE FROM term_relationships WHERE {} = ?", column))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        if self.lookup_table {
            for kind in link_kinds {
                sqlx::query(&format!("DELETE FROM {} WHERE new_id = ? AND entity_kind = ?", ID_MAP_TABLE))
                    .bind(id)
                    .bind(*kind)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_user(&self, login: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM users WHERE login = ?")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn get_meta(&self, object: ObjectKind, id: i64, key: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> = sqlx::query_scalar(
            "SELECT meta_value FROM meta WHERE object_kind = ? AND object_id = ? AND meta_key = ? \
             ORDER BY meta_id LIMIT 1",
        )
        .bind(object.as_str())
        .bind(id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.flatten())
    }

    async fn set_password_hash(&self, user_id: i64, hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_meta_prefix(&self, object: ObjectKind, id: i64, prefix: &str) -> Result<()> {
        sqlx::query("DELETE FROM meta WHERE object_kind = ? AND object_id = ? AND meta_key LIKE ? ESCAPE '\\'")
            .bind(object.as_str())
            .bind(id)
            .bind(escape_like(prefix))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_links_from_meta() {
        let mut meta = FieldValues::new();
        meta.insert("_ferry_legacy_period_id".to_string(), json!(12));
        meta.insert("_ferry_legacy_period_parent_id".to_string(), json!("3"));
        meta.insert("_ferry_legacy_password".to_string(), json!("x"));
        meta.insert("_ferry_legacy_user_id".to_string(), serde_json::Value::Null);

        let links = legacy_links(EntityKind::Period, 7, &meta);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.new_id == 7 && l.entity_kind == EntityKind::Period));
        assert!(links
            .iter()
            .any(|l| l.legacy_key == "_ferry_legacy_period_id" && l.legacy_value == "12"));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("_ferry_"), "\\_ferry\\_%");
        assert_eq!(escape_like("50%"), "50\\%%");
    }
}
