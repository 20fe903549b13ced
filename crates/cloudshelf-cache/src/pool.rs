//! SQLite connection pool
//!
//! Wraps SQLx's `SqlitePool` so that opening an index also:
//! - creates the directory holding the database file
//! - switches the journal to WAL so readers never block the writer
//! - applies the schema
//!
//! [`DatabasePool::in_memory`] gives tests a throwaway database.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

/// How long a writer waits for a competing lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections kept for file-backed databases
const MAX_CONNECTIONS: u32 = 4;

/// Pool of SQLite connections for the resource index
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (or create) the index database at `db_path`
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` if the directory or the connection
    /// cannot be created, `CacheError::MigrationFailed` if the schema
    /// cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_index_dir(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "cannot open index at {}: {e}",
                    db_path.display()
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "Resource index opened");
        Ok(Self { pool })
    }

    /// Throwaway database for tests
    ///
    /// A single connection is used because every SQLite in-memory
    /// connection sees its own database.
    ///
    /// # Errors
    ///
    /// Same as [`DatabasePool::new`].
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| CacheError::ConnectionFailed(format!("in-memory index: {e}")))?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory resource index ready");
        Ok(Self { pool })
    }

    /// The underlying SQLx pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wait for open connections to finish and close them
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::raw_sql(include_str!("migrations/001_initial.sql"))
            .execute(pool)
            .await
            .map_err(|e| CacheError::MigrationFailed(format!("initial schema: {e}")))?;

        tracing::debug!("Index schema applied");
        Ok(())
    }
}

fn create_index_dir(dir: &Path) -> Result<(), CacheError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CacheError::ConnectionFailed(format!("cannot create {}: {e}", dir.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_has_schema() {
        let db = DatabasePool::in_memory().await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/index.db");

        let db = DatabasePool::new(&path).await.unwrap();
        assert!(path.exists());
        db.close().await;

        // Reopening applies the schema again without error
        let db = DatabasePool::new(&path).await.unwrap();
        db.close().await;
    }
}
