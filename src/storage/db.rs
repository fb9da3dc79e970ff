use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::core::error::AppResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subscriptions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id      INTEGER NOT NULL,
    channel_id   TEXT NOT NULL,
    channel_url  TEXT NOT NULL,
    channel_name TEXT NOT NULL,
    quality      TEXT NOT NULL DEFAULT '720',
    created_at   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (chat_id, channel_url)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_chat ON subscriptions(chat_id);

CREATE TABLE IF NOT EXISTS seen_videos (
    subscription_id INTEGER NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
    video_id        TEXT NOT NULL,
    seen_at         TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (subscription_id, video_id)
);

CREATE TABLE IF NOT EXISTS user_settings (
    chat_id       INTEGER PRIMARY KEY,
    download_mode TEXT NOT NULL DEFAULT 'video',
    resolution    INTEGER NOT NULL DEFAULT 1080,
    updated_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections. Every connection
/// enforces foreign keys, and the schema is created if missing.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file. Parent directories are created.
///
/// # Returns
///
/// Returns a `DbPool` on success or an `AppError` if the file or the schema
/// could not be set up.
pub fn create_pool(database_path: &Path) -> AppResult<DbPool> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let manager = SqliteConnectionManager::file(database_path).with_init(configure_connection);
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    let conn = pool.get()?;
    migrate_schema(&conn)?;
    log::info!("🗄️  Database ready at {}", database_path.display());
    Ok(pool)
}

/// Pool over a private in-memory database, shared by a single connection.
/// Used by tests.
pub fn create_memory_pool() -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(configure_connection);
    let pool = Pool::builder().max_size(1).build(manager)?;
    let conn = pool.get()?;
    migrate_schema(&conn)?;
    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

/// Creates missing tables. Safe to run on every start.
fn migrate_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_pool_creates_parent_dir_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("subs.db");
        let pool = create_pool(&path).unwrap();
        assert!(path.exists());

        let conn = get_connection(&pool).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('subscriptions', 'seen_videos', 'user_settings')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);

        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.db");
        drop(create_pool(&path).unwrap());
        assert!(create_pool(&path).is_ok());
    }
}
