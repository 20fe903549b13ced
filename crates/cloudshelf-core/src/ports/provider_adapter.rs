//! Provider adapter port (driven/secondary port)
//!
//! This module defines the capability interface every storage vendor
//! implements. The [`Bucket`](crate::bucket::Bucket) orchestrates listings,
//! mutations and URL generation exclusively through this trait, so vendors
//! can be added without touching the core.
//!
//! ## Design Notes
//!
//! - Errors are classified into [`ProviderError`] so callers can decide
//!   between retrying, degrading and reporting without knowing the vendor.
//! - Adapters hold no per-bucket state; the bucket passes a
//!   [`BucketContext`] on every call. One adapter instance can therefore
//!   serve many buckets concurrently.
//! - Renames are two-phase (copy then delete) and the intermediate failure
//!   mode is explicit: see [`ProviderError::Duplicated`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::domain::bucket_state::Permission;
use crate::domain::errors::ProviderError;
use crate::domain::newtypes::{Cursor, ObjectKey};
use crate::domain::resource::{Resource, Vendor};

// ============================================================================
// Call context and DTOs
// ============================================================================

/// Identifies the bucket a call targets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketContext {
    /// Vendor bucket name (for COS this includes the `-appid` suffix)
    pub name: String,
    /// Vendor region, e.g. `ap-guangzhou`
    pub region: String,
}

impl BucketContext {
    #[must_use]
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
        }
    }
}

/// Parameters of one listing page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this prefix are returned
    pub prefix: String,
    /// Group keys by this delimiter into common prefixes; `None` lists recursively
    pub delimiter: Option<String>,
    /// Continuation token from the previous page
    pub cursor: Option<Cursor>,
    /// Maximum number of entries per page
    pub limit: u32,
}

/// One page of a vendor listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<Resource>,
    /// Directory prefixes, each ending with the delimiter
    pub common_prefixes: Vec<String>,
    /// `None` exactly when the listing is exhausted
    pub next_cursor: Option<Cursor>,
}

/// Streamed object content for uploads
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// Receives upload progress as a fraction in `[0, 1]`
pub type ProgressSink = Arc<dyn Fn(f64) + Send + Sync>;

// ============================================================================
// IProviderAdapter trait
// ============================================================================

/// Capability interface implemented once per storage vendor
///
/// Implementations must be `Send + Sync` so they can be shared across
/// tokio tasks via `Arc<dyn IProviderAdapter>`.
#[async_trait::async_trait]
pub trait IProviderAdapter: Send + Sync {
    /// Vendor implemented by this adapter
    fn vendor(&self) -> Vendor;

    /// Fetch one page of a listing
    ///
    /// Idempotent for a fixed cursor.
    ///
    /// # Errors
    /// `TransientNetwork` (retryable) or `Permission`
    async fn list_page(
        &self,
        ctx: &BucketContext,
        request: &ListRequest,
    ) -> Result<ListPage, ProviderError>;

    /// Read the bucket ACL
    ///
    /// # Errors
    /// `Permission` when the ACL itself is not readable; callers treat
    /// this as [`Permission::Unknown`]
    async fn get_acl(&self, ctx: &BucketContext) -> Result<Permission, ProviderError>;

    /// Enabled custom domains bound to the bucket
    async fn get_domains(&self, ctx: &BucketContext) -> Result<Vec<String>, ProviderError>;

    /// Stream content into `key`
    ///
    /// The sink, when given, receives non-decreasing fractions.
    ///
    /// # Errors
    /// `TransientNetwork`, `QuotaExceeded` or `Aborted`
    async fn put_object(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        body: ObjectBody,
        length: u64,
        progress: Option<ProgressSink>,
    ) -> Result<Resource, ProviderError>;

    /// Ask the vendor to pull `source_url` into `key`
    ///
    /// Vendors without server-side fetch keep the default, which reports
    /// `Unsupported`.
    async fn fetch_remote(
        &self,
        _ctx: &BucketContext,
        source_url: &str,
        _key: &ObjectKey,
    ) -> Result<Resource, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "{} cannot fetch {source_url}",
            self.vendor()
        )))
    }

    /// Delete a single object
    async fn delete_object(&self, ctx: &BucketContext, key: &ObjectKey) -> Result<(), ProviderError>;

    /// Delete many objects, reporting the result of each key
    ///
    /// An `Err` from the call itself means no key was deleted.
    async fn delete_objects(
        &self,
        ctx: &BucketContext,
        keys: &[ObjectKey],
    ) -> Result<HashMap<ObjectKey, Result<(), ProviderError>>, ProviderError>;

    /// Server-side copy of `source` to `target`
    async fn copy_object(
        &self,
        ctx: &BucketContext,
        source: &ObjectKey,
        target: &ObjectKey,
    ) -> Result<Resource, ProviderError>;

    /// Two-phase rename: copy, then delete the source
    ///
    /// The source is never deleted unless the copy succeeded. If the copy
    /// succeeded but the delete failed, returns
    /// [`ProviderError::Duplicated`] and both keys exist.
    async fn rename_object(
        &self,
        ctx: &BucketContext,
        source: &ObjectKey,
        target: &ObjectKey,
    ) -> Result<Resource, ProviderError> {
        let copied = self.copy_object(ctx, source, target).await?;

        if let Err(e) = self.delete_object(ctx, source).await {
            return Err(ProviderError::Duplicated {
                source_key: source.to_string(),
                target_key: target.to_string(),
                reason: e.to_string(),
            });
        }

        Ok(copied)
    }

    /// Build a download URL for `key`
    ///
    /// Pure local computation; no network call. When `requires_signing`
    /// is false the URL must carry no signature parameters.
    fn sign_url(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        expiry: Duration,
        requires_signing: bool,
    ) -> Result<String, ProviderError>;
}
