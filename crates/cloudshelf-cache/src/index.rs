//! SQLite implementation of IResourceIndex
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy |
//! |-----------------|----------|----------|
//! | BucketId        | TEXT     | UUID string via `.to_string()` |
//! | ObjectKey       | TEXT     | `.as_str()` / `ObjectKey::new()` |
//! | is_directory    | INTEGER  | 0 / 1 |
//! | size            | INTEGER  | `i64`, NULL for directories |
//! | DateTime<Utc>   | TEXT     | RFC 3339 via `to_rfc3339()` |
//! | ContentHash     | TEXT     | `.as_str()` / `ContentHash::new()` |
//! | Vendor          | TEXT     | `Vendor::as_str()` / `FromStr` |
//!
//! Every multi-row write runs in one transaction.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cloudshelf_core::domain::{BucketId, ContentHash, ObjectKey, Resource, Vendor};
use cloudshelf_core::ports::IResourceIndex;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::CacheError;

const SELECT_COLUMNS: &str =
    "SELECT key, is_directory, size, modified, content_hash, vendor FROM resources";

/// SQLite-backed [`IResourceIndex`]
#[derive(Debug, Clone)]
pub struct SqliteResourceIndex {
    pool: SqlitePool,
}

impl SqliteResourceIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of indexed entries of a bucket
    pub async fn count(&self, bucket: &BucketId) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM resources WHERE bucket_id = ?")
            .bind(bucket.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::InvalidRow(format!("bad timestamp '{s}': {e}")))
}

fn resource_from_row(row: &SqliteRow) -> Result<Resource, CacheError> {
    let key: String = row.try_get("key")?;
    let is_directory: bool = row.try_get("is_directory")?;
    let size: Option<i64> = row.try_get("size")?;
    let modified: Option<String> = row.try_get("modified")?;
    let content_hash: Option<String> = row.try_get("content_hash")?;
    let vendor: String = row.try_get("vendor")?;

    let key = ObjectKey::new(key).map_err(|e| CacheError::InvalidRow(e.to_string()))?;
    let size = size
        .map(u64::try_from)
        .transpose()
        .map_err(|e| CacheError::InvalidRow(format!("negative size for {key}: {e}")))?;
    let modified = modified.as_deref().map(parse_datetime).transpose()?;
    let content_hash = content_hash
        .map(ContentHash::new)
        .transpose()
        .map_err(|e| CacheError::InvalidRow(e.to_string()))?;
    let vendor =
        Vendor::from_str(&vendor).map_err(|e| CacheError::InvalidRow(e.to_string()))?;

    Ok(Resource::from_parts(
        key,
        is_directory,
        size,
        modified,
        content_hash,
        vendor,
    ))
}

fn size_to_sql(resource: &Resource) -> Result<Option<i64>, CacheError> {
    resource
        .size()
        .map(i64::try_from)
        .transpose()
        .map_err(|e| CacheError::InvalidRow(format!("size of {}: {e}", resource.key())))
}

// ============================================================================
// IResourceIndex implementation
// ============================================================================

#[async_trait::async_trait]
impl IResourceIndex for SqliteResourceIndex {
    async fn upsert(&self, bucket: &BucketId, resources: &[Resource]) -> anyhow::Result<()> {
        if resources.is_empty() {
            return Ok(());
        }
        let bucket_id = bucket.to_string();
        let mut tx = self.pool.begin().await?;

        for resource in resources {
            sqlx::query(
                "INSERT OR REPLACE INTO resources \
                 (bucket_id, key, is_directory, size, modified, content_hash, vendor) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&bucket_id)
            .bind(resource.key().as_str())
            .bind(resource.is_directory())
            .bind(size_to_sql(resource)?)
            .bind(resource.modified().map(|dt| dt.to_rfc3339()))
            .bind(resource.content_hash().map(|h| h.as_str().to_string()))
            .bind(resource.vendor().as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::trace!(bucket = %bucket_id, count = resources.len(), "Indexed resources");
        Ok(())
    }

    async fn remove(&self, bucket: &BucketId, keys: &[ObjectKey]) -> anyhow::Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let bucket_id = bucket.to_string();
        let mut tx = self.pool.begin().await?;

        for key in keys {
            sqlx::query("DELETE FROM resources WHERE bucket_id = ? AND key = ?")
                .bind(&bucket_id)
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::trace!(bucket = %bucket_id, count = keys.len(), "Removed indexed resources");
        Ok(())
    }

    async fn rename(
        &self,
        bucket: &BucketId,
        renames: &[(ObjectKey, ObjectKey)],
    ) -> anyhow::Result<()> {
        if renames.is_empty() {
            return Ok(());
        }
        let bucket_id = bucket.to_string();
        let mut tx = self.pool.begin().await?;

        for (old, new) in renames {
            // The target may already be indexed from an earlier listing
            sqlx::query("DELETE FROM resources WHERE bucket_id = ? AND key = ?")
                .bind(&bucket_id)
                .bind(new.as_str())
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE resources SET key = ? WHERE bucket_id = ? AND key = ?")
                .bind(new.as_str())
                .bind(&bucket_id)
                .bind(old.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::trace!(bucket = %bucket_id, count = renames.len(), "Renamed indexed resources");
        Ok(())
    }

    async fn get(&self, bucket: &BucketId, key: &ObjectKey) -> anyhow::Result<Option<Resource>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE bucket_id = ? AND key = ?"))
            .bind(bucket.to_string())
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(resource_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_prefix(&self, bucket: &BucketId, prefix: &str) -> anyhow::Result<Vec<Resource>> {
        // substr() instead of LIKE so '%' and '_' in keys need no escaping
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE bucket_id = ? AND substr(key, 1, length(?)) = ? ORDER BY key"
        ))
        .bind(bucket.to_string())
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| resource_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }

    async fn clear(&self, bucket: &BucketId) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM resources WHERE bucket_id = ?")
            .bind(bucket.to_string())
            .execute(&self.pool)
            .await?;
        tracing::debug!(bucket = %bucket, removed = result.rows_affected(), "Cleared index");
        Ok(())
    }
}
