//! Resource index port (driven/secondary port)
//!
//! Optional local mirror of remote listings, used to answer lookups without
//! a network round-trip. The index is a cache: the vendor stays
//! authoritative, and a bucket only writes changes the vendor confirmed.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - Renames are applied as one batch so a crash cannot leave half of a
//!   directory under the old prefix in the index.

use crate::domain::newtypes::{BucketId, ObjectKey};
use crate::domain::resource::Resource;

/// Persistent key/metadata store for bucket listings
#[async_trait::async_trait]
pub trait IResourceIndex: Send + Sync {
    /// Insert or replace resources
    async fn upsert(&self, bucket: &BucketId, resources: &[Resource]) -> anyhow::Result<()>;

    /// Remove keys; unknown keys are ignored
    async fn remove(&self, bucket: &BucketId, keys: &[ObjectKey]) -> anyhow::Result<()>;

    /// Move entries from old keys to new keys
    async fn rename(
        &self,
        bucket: &BucketId,
        renames: &[(ObjectKey, ObjectKey)],
    ) -> anyhow::Result<()>;

    /// Look up a single key
    async fn get(&self, bucket: &BucketId, key: &ObjectKey) -> anyhow::Result<Option<Resource>>;

    /// All entries whose key starts with `prefix`, ordered by key
    async fn list_prefix(&self, bucket: &BucketId, prefix: &str) -> anyhow::Result<Vec<Resource>>;

    /// Drop every entry of a bucket
    async fn clear(&self, bucket: &BucketId) -> anyhow::Result<()>;
}
