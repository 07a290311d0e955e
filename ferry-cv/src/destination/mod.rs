//! Destination object store
//!
//! The engine only needs to create and update entities, users and tag terms,
//! attach metadata to them, and find them again by legacy identifier. The
//! [`DestinationStore`] trait is that seam; [`SqliteDestination`] implements it
//! over the service database.

mod sqlite;

pub use sqlite::SqliteDestination;

use async_trait::async_trait;
use ferry_common::Result;
use serde::Serialize;

use crate::convert::entity::{EntityKind, ObjectKind};
use crate::convert::value::ConvertedRow;

/// Durable link from a legacy identifier to the id assigned on import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdMapping {
    pub entity_kind: EntityKind,
    pub new_id: i64,
    pub legacy_key: String,
    pub legacy_value: String,
}

#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Create a period, account or record with its metadata; returns the new id
    async fn insert_entity(&self, kind: EntityKind, row: &ConvertedRow) -> Result<i64>;

    /// Create a user with its metadata; returns the new id
    async fn insert_user(&self, row: &ConvertedRow) -> Result<i64>;

    /// Find or create the tag term and relate it to `account_id`; returns the term id
    async fn attach_tag(&self, account_id: i64, row: &ConvertedRow) -> Result<i64>;

    /// New id of the `kind` object whose own legacy id is `legacy_value`
    async fn find_legacy(&self, kind: EntityKind, legacy_value: &str) -> Result<Option<i64>>;

    async fn parent_of(&self, entity_id: i64) -> Result<Option<i64>>;

    async fn set_parent(&self, entity_id: i64, parent_id: i64) -> Result<()>;

    /// Page of `(object id, value)` for objects carrying a non-empty, non-zero `key`
    async fn objects_with_meta(
        &self,
        object: ObjectKind,
        key: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<(i64, String)>>;

    /// Up to `limit` imported object ids, highest first
    async fn imported_objects(&self, object: ObjectKind, limit: i64) -> Result<Vec<i64>>;

    /// Delete an object with its metadata, relationships and id links
    async fn delete_object(&self, object: ObjectKind, id: i64) -> Result<()>;

    async fn find_user(&self, login: &str) -> Result<Option<i64>>;

    async fn get_meta(&self, object: ObjectKind, id: i64, key: &str) -> Result<Option<String>>;

    async fn set_password_hash(&self, user_id: i64, hash: &str) -> Result<()>;

    /// Remove every metadata row of the object whose key starts with `prefix`
    async fn delete_meta_prefix(&self, object: ObjectKind, id: i64, prefix: &str) -> Result<()>;
}
