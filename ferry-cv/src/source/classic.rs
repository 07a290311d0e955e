//! Reference adapter for the classic forum schema
//!
//! Legacy tables (all carrying the request's table prefix):
//!
//! | table        | columns                                                              |
//! |--------------|----------------------------------------------------------------------|
//! | `forums`     | forum_id, parent_id, forum_name, forum_desc, display_order, created   |
//! | `topics`     | topic_id, forum_id, poster_id, topic_title, closed, deleted, created  |
//! | `posts`      | post_id, topic_id, poster_id, post_text, position, deleted, created   |
//! | `users`      | user_id, username, email, website, display_name, password, salt, registered |
//! | `tags`       | tag_id, tag_name                                                      |
//! | `topic_tags` | topic_id, tag_id                                                      |
//!
//! Forums become periods, topics become accounts (the first post is the
//! account body) and the remaining posts become records.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{PlatformInfo, SourceAdapter};
use crate::convert::entity::{
    EntityKind, LEGACY_PASSWORD_KEY, LEGACY_PLATFORM_KEY, PERIOD_ID_KEY, PERIOD_PARENT_KEY,
    TAG_ACCOUNT_FIELD, TAG_NAME_FIELD, TAG_SLUG_FIELD,
};
use crate::convert::field_map::{FieldMap, FieldMapEntry, JoinSpec, Transform};
use crate::convert::value::SourceRow;

/// Salt stored next to the legacy hash
pub const LEGACY_SALT_KEY: &str = "_ferry_legacy_password_salt";

/// Lowest live position-1 post of the topic; topics without one still convert
const OPENING_POST: &str = "\"posts\".\"post_id\" = (SELECT MIN(\"p\".\"post_id\") FROM \"{prefix}posts\" AS \"p\" \
     WHERE \"p\".\"topic_id\" = \"topics\".\"topic_id\" AND \"p\".\"position\" = 1 AND \"p\".\"deleted\" = 0)";

pub struct ClassicAdapter {
    map: FieldMap,
}

impl ClassicAdapter {
    pub const NAME: &'static str = "classic";

    pub fn new() -> Self {
        Self { map: field_map() }
    }
}

impl Default for ClassicAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for ClassicAdapter {
    fn info(&self) -> PlatformInfo {
        PlatformInfo {
            name: Self::NAME,
            label: "Classic forum",
            description: "Forums, topics and posts with salted SHA-256 passwords",
            password_scheme: "sha256(salt + password)",
        }
    }

    fn field_map(&self) -> &FieldMap {
        &self.map
    }

    /// Legacy hashes are packed as `salt$hex`
    fn authenticate_password(&self, plain: &str, hash: &str) -> bool {
        let Some((salt, expected)) = hash.split_once('$') else {
            return false;
        };
        legacy_hash(salt, plain).eq_ignore_ascii_case(expected)
    }

    fn transform(&self, name: &str, value: &Value, row: &SourceRow) -> Option<Value> {
        match name {
            "topic_status" => Some(Value::from(match value {
                Value::Number(n) if n.as_i64() == Some(1) => "closed",
                _ => "publish",
            })),
            "reply_title" => Some(match value {
                Value::String(title) => Value::String(format!("Re: {}", title)),
                _ => Value::Null,
            }),
            "pack_password" => {
                let Some(hash) = value.as_str() else {
                    return Some(Value::Null);
                };
                let salt = row.get("salt").and_then(Value::as_str).unwrap_or_default();
                Some(Value::String(format!("{}${}", salt, hash)))
            }
            _ => None,
        }
    }
}

/// Hex SHA-256 of the salt followed by the password
pub fn legacy_hash(salt: &str, plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(plain.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn field_map() -> FieldMap {
    use EntityKind::{Account, Period, Record, Tag, User};

    FieldMap::new(vec![
        // Users
        FieldMapEntry::direct(User, User.legacy_id_key(), "users", "user_id"),
        FieldMapEntry::direct(User, "login", "users", "username"),
        FieldMapEntry::transformed(User, "nicename", "users", "username", Transform::Slug),
        FieldMapEntry::direct(User, "email", "users", "email"),
        FieldMapEntry::direct(User, "url", "users", "website"),
        FieldMapEntry::direct(User, "display_name", "users", "display_name"),
        FieldMapEntry::transformed(User, "registered_at", "users", "registered", Transform::Datetime),
        FieldMapEntry::direct(User, LEGACY_SALT_KEY, "users", "salt"),
        FieldMapEntry::transformed(
            User,
            LEGACY_PASSWORD_KEY,
            "users",
            "password",
            Transform::Custom("pack_password"),
        ),
        FieldMapEntry::fixed(User, LEGACY_PLATFORM_KEY, ClassicAdapter::NAME),
        // Periods
        FieldMapEntry::direct(Period, Period.legacy_id_key(), "forums", "forum_id"),
        FieldMapEntry::transformed(Period, PERIOD_PARENT_KEY, "forums", "parent_id", Transform::NonZero),
        FieldMapEntry::direct(Period, "title", "forums", "forum_name"),
        FieldMapEntry::transformed(Period, "slug", "forums", "forum_name", Transform::Slug),
        FieldMapEntry::transformed(Period, "content", "forums", "forum_desc", Transform::Html),
        FieldMapEntry::direct(Period, "menu_order", "forums", "display_order"),
        FieldMapEntry::transformed(Period, "created_at", "forums", "created", Transform::Datetime),
        FieldMapEntry::transformed(Period, "updated_at", "forums", "created", Transform::Datetime),
        FieldMapEntry::fixed(Period, "status", "publish"),
        // Accounts
        FieldMapEntry::direct(Account, Account.legacy_id_key(), "topics", "topic_id")
            .filtered("\"topics\".\"deleted\" = 0"),
        FieldMapEntry::transformed(Account, "parent_id", "topics", "forum_id", Transform::PeriodId),
        FieldMapEntry::transformed(Account, PERIOD_ID_KEY, "topics", "forum_id", Transform::PeriodId),
        FieldMapEntry::transformed(Account, "author_id", "topics", "poster_id", Transform::UserId),
        FieldMapEntry::direct(Account, "title", "topics", "topic_title"),
        FieldMapEntry::transformed(Account, "slug", "topics", "topic_title", Transform::Slug),
        FieldMapEntry::transformed(
            Account,
            "status",
            "topics",
            "closed",
            Transform::Custom("topic_status"),
        ),
        FieldMapEntry::transformed(Account, "created_at", "topics", "created", Transform::Datetime),
        FieldMapEntry::transformed(Account, "content", "posts", "post_text", Transform::Html).joined(
            JoinSpec::left("topic_id", "topic_id").with_on(OPENING_POST),
        ),
        // Tags
        FieldMapEntry::direct(Tag, Tag.legacy_id_key(), "topic_tags", "tag_id"),
        FieldMapEntry::transformed(Tag, TAG_ACCOUNT_FIELD, "topic_tags", "topic_id", Transform::AccountId),
        FieldMapEntry::direct(Tag, TAG_NAME_FIELD, "tags", "tag_name")
            .joined(JoinSpec::inner("tag_id", "tag_id")),
        FieldMapEntry::transformed(Tag, TAG_SLUG_FIELD, "tags", "tag_name", Transform::Slug),
        // Records
        FieldMapEntry::direct(Record, Record.legacy_id_key(), "posts", "post_id")
            .filtered("\"posts\".\"position\" > 1 AND \"posts\".\"deleted\" = 0"),
        FieldMapEntry::transformed(Record, "parent_id", "posts", "topic_id", Transform::AccountId),
        FieldMapEntry::transformed(Record, PERIOD_ID_KEY, "posts", "topic_id", Transform::AccountToPeriod),
        FieldMapEntry::transformed(Record, "author_id", "posts", "poster_id", Transform::UserId),
        FieldMapEntry::transformed(Record, "content", "posts", "post_text", Transform::Html),
        FieldMapEntry::transformed(Record, "created_at", "posts", "created", Transform::Datetime),
        FieldMapEntry::transformed(
            Record,
            "title",
            "topics",
            "topic_title",
            Transform::Custom("reply_title"),
        )
        .joined(JoinSpec::inner("topic_id", "topic_id").with_condition("\"topics\".\"deleted\" = 0")),
        FieldMapEntry::fixed(Record, "status", "publish"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::query::build_page_query;
    use serde_json::json;

    #[test]
    fn test_field_map_is_valid() {
        assert!(ClassicAdapter::new().field_map().validate().is_ok());
    }

    #[test]
    fn test_every_kind_builds_a_query() {
        let adapter = ClassicAdapter::new();
        for kind in EntityKind::ALL {
            let query = build_page_query(adapter.field_map(), kind, "bb_", 0, 10).unwrap();
            assert!(query.sql.contains("\"bb_"), "{}", query.sql);
        }
    }

    #[test]
    fn test_opening_post_join_uses_table_prefix() {
        let adapter = ClassicAdapter::new();
        let sql = build_page_query(adapter.field_map(), EntityKind::Account, "bb_", 0, 10)
            .unwrap()
            .sql;
        assert!(sql.contains("LEFT JOIN \"bb_posts\" AS \"posts\" ON"), "{}", sql);
        assert!(sql.contains("FROM \"bb_posts\" AS \"p\""), "{}", sql);
        assert!(!sql.contains("{prefix}"), "{}", sql);
        assert!(sql.contains(" WHERE (\"topics\".\"deleted\" = 0) ORDER BY"), "{}", sql);
    }

    #[test]
    fn test_authenticate_password() {
        let adapter = ClassicAdapter::new();
        let packed = format!("s4lt${}", legacy_hash("s4lt", "hunter2"));

        assert!(adapter.authenticate_password("hunter2", &packed));
        assert!(!adapter.authenticate_password("hunter3", &packed));
        assert!(!adapter.authenticate_password("hunter2", "no-separator"));
    }

    #[test]
    fn test_custom_transforms() {
        let adapter = ClassicAdapter::new();
        let mut row = SourceRow::new();
        row.insert("salt".to_string(), json!("abc"));

        assert_eq!(adapter.transform("pack_password", &json!("ff00"), &row), Some(json!("abc$ff00")));
        assert_eq!(adapter.transform("topic_status", &json!(1), &row), Some(json!("closed")));
        assert_eq!(adapter.transform("topic_status", &json!(0), &row), Some(json!("publish")));
        assert_eq!(adapter.transform("reply_title", &json!("Hi"), &row), Some(json!("Re: Hi")));
        assert_eq!(adapter.transform("pack_password", &Value::Null, &row), Some(Value::Null));
        assert_eq!(adapter.transform("nope", &json!(1), &row), None);
    }
}
