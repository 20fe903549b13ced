//! In-memory provider adapter
//!
//! Implements [`IProviderAdapter`] over process-local maps with S3-style
//! listing semantics (prefix, delimiter grouping, marker pagination). Hosts
//! use it for dry runs; tests use its fault injection to exercise partial
//! failures, throttling and concurrency limits without a network.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use url::Url;

use crate::domain::bucket_state::Permission;
use crate::domain::errors::ProviderError;
use crate::domain::newtypes::{ContentHash, Cursor, ObjectKey};
use crate::domain::resource::{Resource, Vendor};
use crate::ports::provider_adapter::{
    BucketContext, IProviderAdapter, ListPage, ListRequest, ObjectBody, ProgressSink,
};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
    etag: String,
}

impl StoredObject {
    fn new(data: Vec<u8>, modified: DateTime<Utc>) -> Self {
        let etag = hex::encode(Md5::digest(&data));
        Self {
            data,
            modified,
            etag,
        }
    }

    fn to_resource(&self, key: &str) -> Result<Resource, ProviderError> {
        let key = ObjectKey::new(key.to_string())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let mut resource = Resource::object(key, self.data.len() as u64, Vendor::Memory)
            .with_modified(self.modified);
        if let Ok(hash) = ContentHash::new(self.etag.clone()) {
            resource = resource.with_hash(hash);
        }
        Ok(resource)
    }
}

/// Injected failures, keyed by object key where relevant
#[derive(Debug, Default)]
struct Faults {
    acl: Option<ProviderError>,
    domains: Option<ProviderError>,
    transient_lists: u32,
    list_error: Option<ProviderError>,
    denied_deletes: HashSet<String>,
    denied_copies: HashSet<String>,
    failed_puts: HashMap<String, ProviderError>,
    transient_puts: HashMap<String, u32>,
}

#[derive(Debug, Default)]
struct BucketData {
    objects: BTreeMap<String, StoredObject>,
    permission: Option<Permission>,
    domains: Vec<String>,
}

/// Process-local object store
#[derive(Debug, Default)]
pub struct MemoryProvider {
    buckets: Mutex<HashMap<String, BucketData>>,
    faults: Mutex<Faults>,
    put_delay: Mutex<Duration>,
    puts_in_flight: AtomicUsize,
    max_puts_in_flight: AtomicUsize,
    put_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning an `Arc`
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, BucketData>> {
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    /// Store an object directly, bypassing `put_object`
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>, modified: DateTime<Utc>) {
        self.buckets()
            .entry(bucket.to_string())
            .or_default()
            .objects
            .insert(key.to_string(), StoredObject::new(data.into(), modified));
    }

    /// Set the ACL answer for a bucket
    pub fn set_permission(&self, bucket: &str, permission: Permission) {
        self.buckets().entry(bucket.to_string()).or_default().permission = Some(permission);
    }

    /// Set the enabled custom domains of a bucket
    pub fn set_domains(&self, bucket: &str, domains: &[&str]) {
        self.buckets().entry(bucket.to_string()).or_default().domains =
            domains.iter().map(|d| (*d).to_string()).collect();
    }

    /// Keys currently stored in a bucket, sorted
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets()
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Content of a stored object
    #[must_use]
    pub fn content(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets()
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .map(|o| o.data.clone())
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    pub fn fail_acl(&self, error: ProviderError) {
        self.faults().acl = Some(error);
    }

    pub fn fail_domains(&self, error: ProviderError) {
        self.faults().domains = Some(error);
    }

    /// Make the next `count` listing calls fail with a transient error
    pub fn fail_next_lists(&self, count: u32) {
        self.faults().transient_lists = count;
    }

    /// Make every listing call fail with `error`
    pub fn fail_lists(&self, error: ProviderError) {
        self.faults().list_error = Some(error);
    }

    /// Deny deletion of `key` with a permission error
    pub fn deny_delete(&self, key: &str) {
        self.faults().denied_deletes.insert(key.to_string());
    }

    /// Deny copying from `key` with a permission error
    pub fn deny_copy(&self, key: &str) {
        self.faults().denied_copies.insert(key.to_string());
    }

    /// Make every upload to `key` fail with `error`
    pub fn fail_put(&self, key: &str, error: ProviderError) {
        self.faults().failed_puts.insert(key.to_string(), error);
    }

    /// Make the next `count` uploads to `key` fail with a transient error
    pub fn fail_next_puts(&self, key: &str, count: u32) {
        self.faults().transient_puts.insert(key.to_string(), count);
    }

    /// Hold each upload for `delay` so concurrency becomes observable
    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap_or_else(|p| p.into_inner()) = delay;
    }

    // ========================================================================
    // Call statistics
    // ========================================================================

    /// Highest number of uploads observed in flight at once
    #[must_use]
    pub fn max_concurrent_puts(&self) -> usize {
        self.max_puts_in_flight.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn take_put_fault(&self, key: &str) -> Option<ProviderError> {
        let mut faults = self.faults();
        if let Some(err) = faults.failed_puts.get(key) {
            return Some(err.clone());
        }
        match faults.transient_puts.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Some(ProviderError::TransientNetwork(format!(
                    "injected upload failure for {key}"
                )))
            }
            _ => None,
        }
    }
}

/// Emits entries after `marker` in key order, grouping by delimiter
fn paginate(
    objects: &BTreeMap<String, StoredObject>,
    request: &ListRequest,
) -> Result<ListPage, ProviderError> {
    let marker = request.cursor.as_ref().map(Cursor::as_str);
    let limit = request.limit.max(1) as usize;

    let mut page = ListPage::default();
    let mut emitted = 0usize;
    let mut last_emitted: Option<String> = None;
    let mut truncated = false;

    for (key, object) in objects.range(request.prefix.clone()..) {
        if !key.starts_with(&request.prefix) {
            break;
        }

        let rest = &key[request.prefix.len()..];
        let entry = match request.delimiter.as_deref() {
            Some(delim) if !delim.is_empty() => match rest.find(delim) {
                Some(idx) => Some(format!(
                    "{}{}",
                    request.prefix,
                    &rest[..idx + delim.len()]
                )),
                None => None,
            },
            _ => None,
        };

        let emitted_key = entry.clone().unwrap_or_else(|| key.clone());
        if marker.is_some_and(|m| emitted_key.as_str() <= m) {
            continue;
        }
        if last_emitted.as_deref() == Some(emitted_key.as_str()) {
            continue;
        }

        if emitted == limit {
            truncated = true;
            break;
        }

        match entry {
            Some(prefix) => page.common_prefixes.push(prefix),
            None => page.objects.push(object.to_resource(key)?),
        }
        emitted += 1;
        last_emitted = Some(emitted_key);
    }

    if truncated {
        page.next_cursor = last_emitted.and_then(|k| Cursor::new(k).ok());
    }
    Ok(page)
}

#[async_trait::async_trait]
impl IProviderAdapter for MemoryProvider {
    fn vendor(&self) -> Vendor {
        Vendor::Memory
    }

    async fn list_page(
        &self,
        ctx: &BucketContext,
        request: &ListRequest,
    ) -> Result<ListPage, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = self.faults();
            if let Some(err) = &faults.list_error {
                return Err(err.clone());
            }
            if faults.transient_lists > 0 {
                faults.transient_lists -= 1;
                return Err(ProviderError::TransientNetwork(
                    "injected listing failure".to_string(),
                ));
            }
        }

        let buckets = self.buckets();
        match buckets.get(&ctx.name) {
            Some(bucket) => paginate(&bucket.objects, request),
            None => Ok(ListPage::default()),
        }
    }

    async fn get_acl(&self, ctx: &BucketContext) -> Result<Permission, ProviderError> {
        if let Some(err) = &self.faults().acl {
            return Err(err.clone());
        }
        Ok(self
            .buckets()
            .get(&ctx.name)
            .and_then(|b| b.permission)
            .unwrap_or(Permission::Private))
    }

    async fn get_domains(&self, ctx: &BucketContext) -> Result<Vec<String>, ProviderError> {
        if let Some(err) = &self.faults().domains {
            return Err(err.clone());
        }
        Ok(self
            .buckets()
            .get(&ctx.name)
            .map(|b| b.domains.clone())
            .unwrap_or_default())
    }

    async fn put_object(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        mut body: ObjectBody,
        length: u64,
        progress: Option<ProgressSink>,
    ) -> Result<Resource, ProviderError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.puts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_puts_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let result = async {
            let delay = *self.put_delay.lock().unwrap_or_else(|p| p.into_inner());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if let Some(err) = self.take_put_fault(key.as_str()) {
                return Err(err);
            }

            let mut data = Vec::with_capacity(length as usize);
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                let n = body
                    .read(&mut chunk)
                    .await
                    .map_err(|e| ProviderError::TransientNetwork(e.to_string()))?;
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&chunk[..n]);
                if let Some(sink) = &progress {
                    if length > 0 {
                        sink((data.len() as f64 / length as f64).min(1.0));
                    }
                }
            }
            if let Some(sink) = &progress {
                sink(1.0);
            }

            let stored = StoredObject::new(data, Utc::now());
            let resource = stored.to_resource(key.as_str())?;
            self.buckets()
                .entry(ctx.name.clone())
                .or_default()
                .objects
                .insert(key.as_str().to_string(), stored);
            Ok(resource)
        }
        .await;

        self.puts_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_object(&self, ctx: &BucketContext, key: &ObjectKey) -> Result<(), ProviderError> {
        if self.faults().denied_deletes.contains(key.as_str()) {
            return Err(ProviderError::Permission(format!("delete denied for {key}")));
        }
        if let Some(bucket) = self.buckets().get_mut(&ctx.name) {
            bucket.objects.remove(key.as_str());
        }
        Ok(())
    }

    async fn delete_objects(
        &self,
        ctx: &BucketContext,
        keys: &[ObjectKey],
    ) -> Result<HashMap<ObjectKey, Result<(), ProviderError>>, ProviderError> {
        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            let result = self.delete_object(ctx, key).await;
            results.insert(key.clone(), result);
        }
        Ok(results)
    }

    async fn copy_object(
        &self,
        ctx: &BucketContext,
        source: &ObjectKey,
        target: &ObjectKey,
    ) -> Result<Resource, ProviderError> {
        if self.faults().denied_copies.contains(source.as_str()) {
            return Err(ProviderError::Permission(format!("copy denied for {source}")));
        }

        let mut buckets = self.buckets();
        let bucket = buckets
            .get_mut(&ctx.name)
            .ok_or_else(|| ProviderError::NotFound(ctx.name.clone()))?;
        let object = bucket
            .objects
            .get(source.as_str())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(source.to_string()))?;
        let copied = StoredObject::new(object.data, Utc::now());
        let resource = copied.to_resource(target.as_str())?;
        bucket.objects.insert(target.as_str().to_string(), copied);
        Ok(resource)
    }

    fn sign_url(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        expiry: Duration,
        requires_signing: bool,
    ) -> Result<String, ProviderError> {
        let base = format!("https://{}.memory.invalid/", ctx.name);
        let mut url = Url::parse(&base).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        url.set_path(key.as_str());

        if requires_signing {
            let expires = Utc::now().timestamp() + expiry.as_secs() as i64;
            let signature =
                hex::encode(Md5::digest(format!("{}:{}:{expires}", ctx.name, key).as_bytes()));
            url.query_pairs_mut()
                .append_pair("expires", &expires.to_string())
                .append_pair("signature", &signature);
        }
        Ok(url.to_string())
    }
}
