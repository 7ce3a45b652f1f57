use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, StoreError};

// ============================================================================
// Database
// ============================================================================

/// SQLite-backed record store.
///
/// Cheap to clone: clones share the same connection pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database shared by all pool
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process holds the database lock,
    /// `StoreError::Migration` if the schema could not be created, and
    /// `StoreError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout lets concurrent ingestors writing the same file wait for
        // the writer lock instead of failing immediately with SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                StoreError::Locked
            } else {
                StoreError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Record store opened");
        Ok(db)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Partition key `source`, sort key `timest`; guid unique per partition.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                source TEXT NOT NULL,
                timest INTEGER NOT NULL,
                guid TEXT NOT NULL,
                datestr TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                fulltxt TEXT NOT NULL,
                rawhtml TEXT NOT NULL,
                link TEXT NOT NULL,
                author TEXT NOT NULL,
                tag TEXT NOT NULL,
                lower_tag TEXT NOT NULL,
                categories TEXT NOT NULL,
                visible TEXT NOT NULL DEFAULT 'y',
                UNIQUE(source, guid)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Primary range index: one category, ordered by time
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_source_timest ON posts(source, timest, guid)",
        )
        .execute(&mut *tx)
        .await?;

        // Secondary index: every visible post across categories, ordered by time
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_visible_timest ON posts(visible, timest, source, guid)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
