//! CloudShelf Cache - Persisted resource index
//!
//! SQLite-based mirror of bucket listings, keyed by `(bucket_id, key)`.
//!
//! ## Architecture
//!
//! This crate implements the `IResourceIndex` port from `cloudshelf-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture; buckets write to it only after the vendor
//! confirmed a change, and never read from it to decide what exists.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteResourceIndex`] - `IResourceIndex` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cloudshelf_cache::{DatabasePool, SqliteResourceIndex};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/cloudshelf/index.db")).await?;
//! let index = Arc::new(SqliteResourceIndex::new(pool.pool().clone()));
//! // Pass to Bucket::with_index...
//! # Ok(())
//! # }
//! ```

pub mod index;
pub mod pool;

pub use index::SqliteResourceIndex;
pub use pool::DatabasePool;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be turned back into a domain value
    #[error("Invalid index row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
