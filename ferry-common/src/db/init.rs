//! Database initialization
//!
//! Creates the destination data model on first run. Every `CREATE` is
//! idempotent so opening an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Name of the optional legacy-id lookup table
pub const ID_MAP_TABLE: &str = "conversion_id_map";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every destination table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_entities_table(pool).await?;
    create_users_table(pool).await?;
    create_terms_tables(pool).await?;
    create_meta_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration and conversion progress key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Post-like entities: periods, accounts and records share one table
async fn create_entities_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK (kind IN ('period', 'account', 'record')),
            parent_id INTEGER NOT NULL DEFAULT 0,
            author_id INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            slug TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'publish',
            created_at TEXT,
            updated_at TEXT,
            menu_order INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_kind_parent ON entities(kind, parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            login TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL DEFAULT '',
            nicename TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            display_name TEXT NOT NULL DEFAULT '',
            status INTEGER NOT NULL DEFAULT 0,
            registered_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_terms_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS terms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            taxonomy TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            UNIQUE (taxonomy, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS term_relationships (
            entity_id INTEGER NOT NULL,
            term_id INTEGER NOT NULL,
            PRIMARY KEY (entity_id, term_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Key/value metadata attached to entities, users and terms
async fn create_meta_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
            object_kind TEXT NOT NULL CHECK (object_kind IN ('entity', 'user', 'term')),
            object_id INTEGER NOT NULL,
            meta_key TEXT NOT NULL,
            meta_value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_meta_object ON meta(object_kind, object_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_meta_key_value ON meta(meta_key, meta_value)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the optional legacy-id lookup table
///
/// The converter works without this table by scanning `meta`; the table only
/// turns those scans into indexed lookups.
pub async fn create_id_map_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversion_id_map (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_kind TEXT NOT NULL,
            new_id INTEGER NOT NULL,
            legacy_key TEXT NOT NULL,
            legacy_value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_id_map_new_id ON conversion_id_map(new_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_id_map_legacy ON conversion_id_map(legacy_key, legacy_value)",
    )
    .execute(pool)
    .await?;

    info!("Lookup table {} ready", ID_MAP_TABLE);
    Ok(())
}

/// Whether the lookup table exists in this database
pub async fn id_map_table_exists(pool: &SqlitePool) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
    )
    .bind(ID_MAP_TABLE)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Initialize or update default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    super::settings::ensure_setting(pool, "convert_rows_per_page", "100").await?;

    info!("Default settings initialized");
    Ok(())
}
