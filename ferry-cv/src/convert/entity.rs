//! Destination entity kinds and the metadata key conventions that link
//! imported objects back to their legacy rows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace prefix carried by every metadata key the converter writes.
/// Any object holding such a key counts as imported.
pub const META_PREFIX: &str = "_ferry_";

/// Prefix for metadata recording legacy identifiers
pub const LEGACY_PREFIX: &str = "_ferry_legacy_";

/// Legacy password hash kept on converted users until their first login
pub const LEGACY_PASSWORD_KEY: &str = "_ferry_legacy_password";

/// Platform whose scheme produced a user's legacy password hash
pub const LEGACY_PLATFORM_KEY: &str = "_ferry_legacy_platform";

/// Legacy parent of a period, consumed by the hierarchy step
pub const PERIOD_PARENT_KEY: &str = "_ferry_legacy_period_parent_id";

/// New period id stored on accounts and records
pub const PERIOD_ID_KEY: &str = "_ferry_period_id";

/// Taxonomy tags are attached under
pub const TAG_TAXONOMY: &str = "account_tag";

/// Tag fields consumed by the attach step rather than stored as metadata
pub const TAG_ACCOUNT_FIELD: &str = "account_id";
pub const TAG_NAME_FIELD: &str = "name";
pub const TAG_SLUG_FIELD: &str = "slug";

const POST_CORE_FIELDS: &[&str] = &[
    "parent_id",
    "author_id",
    "title",
    "content",
    "slug",
    "status",
    "created_at",
    "updated_at",
    "menu_order",
];

const USER_CORE_FIELDS: &[&str] = &[
    "login",
    "password_hash",
    "nicename",
    "email",
    "url",
    "display_name",
    "status",
    "registered_at",
];

/// Destination entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Period,
    Account,
    Record,
    User,
    Tag,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Period,
        EntityKind::Account,
        EntityKind::Record,
        EntityKind::User,
        EntityKind::Tag,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Period => "period",
            EntityKind::Account => "account",
            EntityKind::Record => "record",
            EntityKind::User => "user",
            EntityKind::Tag => "tag",
        }
    }

    /// Plural used in progress lines ("Converting periods ...")
    pub const fn plural(self) -> &'static str {
        match self {
            EntityKind::Period => "periods",
            EntityKind::Account => "accounts",
            EntityKind::Record => "records",
            EntityKind::User => "users",
            EntityKind::Tag => "tags",
        }
    }

    /// Destination columns for this kind; any other mapped field is metadata.
    /// Tags have no core fields.
    pub fn core_fields(self) -> &'static [&'static str] {
        match self {
            EntityKind::Period | EntityKind::Account | EntityKind::Record => POST_CORE_FIELDS,
            EntityKind::User => USER_CORE_FIELDS,
            EntityKind::Tag => &[],
        }
    }

    pub fn is_core_field(self, field: &str) -> bool {
        self.core_fields().contains(&field)
    }

    /// Metadata key holding an object's own legacy identifier
    pub const fn legacy_id_key(self) -> &'static str {
        match self {
            EntityKind::Period => "_ferry_legacy_period_id",
            EntityKind::Account => "_ferry_legacy_account_id",
            EntityKind::Record => "_ferry_legacy_record_id",
            EntityKind::User => "_ferry_legacy_user_id",
            EntityKind::Tag => "_ferry_legacy_tag_id",
        }
    }

    /// Which destination table family stores this kind
    pub const fn object_kind(self) -> ObjectKind {
        match self {
            EntityKind::Period | EntityKind::Account | EntityKind::Record => ObjectKind::Entity,
            EntityKind::User => ObjectKind::User,
            EntityKind::Tag => ObjectKind::Term,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner family of a metadata row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Entity,
    User,
    Term,
}

impl ObjectKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Entity => "entity",
            ObjectKind::User => "user",
            ObjectKind::Term => "term",
        }
    }
}

/// Whether a metadata key links an object to a legacy identifier.
///
/// Every such key produces an id mapping when the object is inserted.
pub fn is_legacy_link(key: &str) -> bool {
    key.starts_with(LEGACY_PREFIX) && key.ends_with("_id")
}
