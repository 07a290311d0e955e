//! Shared fixtures: a legacy forum database and a fresh destination database

#![allow(dead_code)]

use ferry_common::db::{create_id_map_table, init_database};
use ferry_cv::source::classic::legacy_hash;
use ferry_cv::source::{SourceConnection, SourceDb};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PREFIX: &str = "bb_";

const LEGACY_SCHEMA: &[&str] = &[
    "CREATE TABLE bb_forums (forum_id INTEGER PRIMARY KEY, parent_id INTEGER NOT NULL DEFAULT 0, \
     forum_name TEXT NOT NULL, forum_desc TEXT, display_order INTEGER NOT NULL DEFAULT 0, created INTEGER)",
    "CREATE TABLE bb_topics (topic_id INTEGER PRIMARY KEY, forum_id INTEGER, poster_id INTEGER, \
     topic_title TEXT, closed INTEGER NOT NULL DEFAULT 0, deleted INTEGER NOT NULL DEFAULT 0, created INTEGER)",
    "CREATE TABLE bb_posts (post_id INTEGER PRIMARY KEY, topic_id INTEGER, poster_id INTEGER, \
     post_text TEXT, position INTEGER NOT NULL, deleted INTEGER NOT NULL DEFAULT 0, created INTEGER)",
    "CREATE TABLE bb_users (user_id INTEGER PRIMARY KEY, username TEXT, email TEXT, website TEXT, \
     display_name TEXT, password TEXT, salt TEXT, registered INTEGER)",
    "CREATE TABLE bb_tags (tag_id INTEGER PRIMARY KEY, tag_name TEXT)",
    "CREATE TABLE bb_topic_tags (topic_id INTEGER, tag_id INTEGER)",
];

/// Writable legacy database; [`LegacyFixture::finish`] reopens it read-only
pub struct LegacyFixture {
    pub path: PathBuf,
    pool: SqlitePool,
}

impl LegacyFixture {
    pub async fn create(dir: &Path) -> Self {
        let path = dir.join("legacy.db");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .expect("create legacy database");

        for statement in LEGACY_SCHEMA {
            sqlx::query(statement).execute(&pool).await.expect("legacy schema");
        }

        Self { path, pool }
    }

    pub async fn exec(&self, sql: &str) {
        sqlx::query(sql).execute(&self.pool).await.expect(sql);
    }

    pub async fn add_forum(&self, id: i64, parent: i64, name: &str) {
        sqlx::query(
            "INSERT INTO bb_forums (forum_id, parent_id, forum_name, forum_desc, display_order, created) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(parent)
        .bind(name)
        .bind(format!("About {}", name))
        .bind(id)
        .bind(1_000_000_000 + id)
        .execute(&self.pool)
        .await
        .expect("insert forum");
    }

    /// Forums `1..=count`, all top level
    pub async fn add_forums(&self, count: i64) {
        let mut tx = self.pool.begin().await.expect("begin");
        for id in 1..=count {
            sqlx::query("INSERT INTO bb_forums (forum_id, forum_name, created) VALUES (?, ?, ?)")
                .bind(id)
                .bind(format!("Forum {}", id))
                .bind(1_000_000_000 + id)
                .execute(&mut *tx)
                .await
                .expect("insert forum");
        }
        tx.commit().await.expect("commit");
    }

    pub async fn add_user(&self, id: i64, username: &str, password: &str) {
        let salt = format!("salt{}", id);
        sqlx::query(
            "INSERT INTO bb_users (user_id, username, email, website, display_name, password, salt, registered) \
             VALUES (?, ?, ?, '', ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(username)
        .bind(format!("{}@example.com", username))
        .bind(username)
        .bind(legacy_hash(&salt, password))
        .bind(&salt)
        .bind(1_100_000_000 + id)
        .execute(&self.pool)
        .await
        .expect("insert user");
    }

    /// Topic plus its opening post (position 1, post id `topic * 100`)
    pub async fn add_topic(&self, id: i64, forum: i64, poster: i64, title: &str) {
        sqlx::query(
            "INSERT INTO bb_topics (topic_id, forum_id, poster_id, topic_title, created) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(forum)
        .bind(poster)
        .bind(title)
        .bind(1_200_000_000 + id)
        .execute(&self.pool)
        .await
        .expect("insert topic");

        self.add_post(id * 100, id, poster, &format!("Body of {}", title), 1)
            .await;
    }

    pub async fn add_post(&self, id: i64, topic: i64, poster: i64, text: &str, position: i64) {
        sqlx::query(
            "INSERT INTO bb_posts (post_id, topic_id, poster_id, post_text, position, created) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(topic)
        .bind(poster)
        .bind(text)
        .bind(position)
        .bind(1_300_000_000 + id)
        .execute(&self.pool)
        .await
        .expect("insert post");
    }

    pub async fn add_tag(&self, id: i64, name: &str) {
        sqlx::query("INSERT INTO bb_tags (tag_id, tag_name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await
            .expect("insert tag");
    }

    pub async fn tag_topic(&self, topic: i64, tag: i64) {
        sqlx::query("INSERT INTO bb_topic_tags (topic_id, tag_id) VALUES (?, ?)")
            .bind(topic)
            .bind(tag)
            .execute(&self.pool)
            .await
            .expect("tag topic");
    }

    pub fn connection(&self) -> SourceConnection {
        SourceConnection::sqlite(self.path.to_string_lossy(), PREFIX)
    }

    /// Close the writer and open the read-only source
    pub async fn finish(self) -> (SourceConnection, SourceDb) {
        self.pool.close().await;
        let connection = SourceConnection::sqlite(self.path.to_string_lossy(), PREFIX);
        let source = SourceDb::connect(&connection)
            .await
            .expect("open legacy database read-only");
        (connection, source)
    }
}

/// Initialized destination database, optionally with the id map table
pub async fn destination(dir: &Path, lookup_table: bool) -> SqlitePool {
    let pool = init_database(&dir.join("ferry.db"))
        .await
        .expect("init destination");
    if lookup_table {
        create_id_map_table(&pool).await.expect("id map table");
    }
    pool
}

pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.expect(sql)
}

/// New id of the entity carrying `key = value`
pub async fn entity_by_meta(pool: &SqlitePool, key: &str, value: &str) -> i64 {
    sqlx::query_scalar(
        "SELECT object_id FROM meta WHERE object_kind = 'entity' AND meta_key = ? AND meta_value = ?",
    )
    .bind(key)
    .bind(value)
    .fetch_one(pool)
    .await
    .expect("entity by meta")
}
