//! Uploads and remote fetches
//!
//! [`BucketHandle`] carries just what a transfer needs (adapter, context,
//! retry policy), so many transfers can run concurrently without holding a
//! borrow of the [`Bucket`]. Results are merged back with
//! [`Bucket::record_uploaded`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Bucket, BucketError};
use crate::domain::errors::ProviderError;
use crate::domain::newtypes::ObjectKey;
use crate::domain::resource::Resource;
use crate::ports::{BucketContext, IProviderAdapter, ObjectBody, ProgressSink};
use crate::retry::RetryPolicy;

/// Detached transfer capability of a bucket
#[derive(Clone)]
pub struct BucketHandle {
    adapter: Arc<dyn IProviderAdapter>,
    context: BucketContext,
    retry: RetryPolicy,
}

impl std::fmt::Debug for BucketHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketHandle")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Wrap a sink so it never reports a smaller fraction than before
///
/// Retried uploads restart from zero at the vendor; the caller keeps
/// seeing the highest fraction reached.
#[must_use]
pub fn monotonic_progress(sink: ProgressSink) -> ProgressSink {
    let best = Arc::new(AtomicU64::new(0f64.to_bits()));
    Arc::new(move |fraction: f64| {
        let fraction = fraction.clamp(0.0, 1.0);
        let mut current = best.load(Ordering::SeqCst);
        loop {
            if fraction <= f64::from_bits(current) {
                return;
            }
            match best.compare_exchange(current, fraction.to_bits(), Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        sink(fraction);
    })
}

impl BucketHandle {
    /// Bucket this handle writes to
    #[must_use]
    pub fn context(&self) -> &BucketContext {
        &self.context
    }

    /// Upload a local file to `key`
    ///
    /// Transient failures reopen the file and retry. Progress is reported
    /// as a non-decreasing fraction.
    pub async fn put_file(
        &self,
        key: &ObjectKey,
        path: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<Resource, ProviderError> {
        let progress = progress.map(monotonic_progress);
        let adapter = &self.adapter;
        let ctx = &self.context;
        let progress = &progress;

        self.retry
            .run("put_object", cancel, || async move {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| ProviderError::LocalIo(format!("{}: {e}", path.display())))?;
                let length = file
                    .metadata()
                    .await
                    .map_err(|e| ProviderError::LocalIo(format!("{}: {e}", path.display())))?
                    .len();
                let body: ObjectBody = Box::new(file);
                debug!(key = %key, length, "Uploading");
                adapter.put_object(ctx, key, body, length, progress.clone()).await
            })
            .await
    }

    /// Ask the vendor to pull `source_url` into `key`
    pub async fn fetch_remote(
        &self,
        source_url: &str,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Resource, ProviderError> {
        let adapter = &self.adapter;
        let ctx = &self.context;
        self.retry
            .run("fetch_remote", cancel, || async move {
                adapter.fetch_remote(ctx, source_url, key).await
            })
            .await
    }
}

impl Bucket {
    /// Detached handle for concurrent transfers
    #[must_use]
    pub fn transfer_handle(&self) -> BucketHandle {
        BucketHandle {
            adapter: self.adapter.clone(),
            context: self.context.clone(),
            retry: self.settings.retry,
        }
    }

    /// Upload a local file and merge the result into the listing
    pub async fn upload_file(
        &mut self,
        key: &ObjectKey,
        path: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<Resource, BucketError> {
        let resource = self
            .transfer_handle()
            .put_file(key, path, progress, cancel)
            .await?;
        self.record_uploaded(std::slice::from_ref(&resource)).await;
        Ok(resource)
    }

    /// Fetch a remote URL into `key` and merge the result into the listing
    pub async fn fetch_url(
        &mut self,
        source_url: &str,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Resource, BucketError> {
        let resource = self
            .transfer_handle()
            .fetch_remote(source_url, key, cancel)
            .await?;
        self.record_uploaded(std::slice::from_ref(&resource)).await;
        Ok(resource)
    }

    /// Merge confirmed uploads into the listing and the index
    pub async fn record_uploaded(&mut self, resources: &[Resource]) {
        for resource in resources {
            if let Some(entry) = self.view_entry_for(resource) {
                if entry.is_directory() {
                    self.insert_listed(entry);
                } else {
                    self.replace_listed(entry);
                }
            }
        }
        self.index_upsert(resources).await;
    }
}
