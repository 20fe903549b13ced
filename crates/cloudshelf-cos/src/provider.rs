//! CosProvider - IProviderAdapter implementation for Tencent COS
//!
//! Wraps a [`CosClient`] and maps each port capability onto one COS API
//! call. The provider holds no bucket state; everything bucket-specific
//! arrives through the [`BucketContext`].
//!
//! ## Design Notes
//!
//! - COS has no server-side fetch for plain buckets, so `fetch_remote`
//!   relays: the source is downloaded as a stream and piped into a
//!   `PUT Object` without buffering.
//! - `copy_object` follows the copy with a `HEAD` so the returned resource
//!   carries the real size.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use cloudshelf_core::domain::{ContentHash, ObjectKey, Permission, ProviderError, Resource, Vendor};
use cloudshelf_core::ports::{
    BucketContext, IProviderAdapter, ListPage, ListRequest, ObjectBody, ProgressSink,
};
use futures_util::StreamExt;
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::{Body, Method, StatusCode};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::client::CosClient;
use crate::{xml, CosError};

/// Error code COS returns when a bucket has no domain configuration
const NO_DOMAIN_CODE: &str = "NoSuchDomainConfiguration";

fn etag_hash(headers: &HeaderMap) -> Option<ContentHash> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| ContentHash::new(v.to_string()).ok())
}

fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Map a per-key code from a batch delete onto the port taxonomy
fn delete_failure_error(failure: &xml::DeleteFailure) -> ProviderError {
    let status = match failure.code.as_str() {
        "AccessDenied" => StatusCode::FORBIDDEN,
        "NoSuchKey" => StatusCode::NOT_FOUND,
        "SlowDown" | "InternalError" | "ServiceUnavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    CosError::Status {
        status,
        code: failure.code.clone(),
        message: failure.message.clone(),
    }
    .into()
}

/// Cloud storage adapter backed by the COS XML API
#[derive(Debug, Clone)]
pub struct CosProvider {
    client: CosClient,
}

impl CosProvider {
    pub fn new(client: CosClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CosClient {
        &self.client
    }

    async fn head_object(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
    ) -> Result<Resource, CosError> {
        let url = self.client.object_url(ctx, key)?;
        let response = CosClient::send(self.client.request(Method::HEAD, url, &[])?).await?;
        let headers = response.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let mut resource = Resource::object(key.clone(), size, Vendor::TencentCos);
        if let Some(hash) = etag_hash(headers) {
            resource = resource.with_hash(hash);
        }
        if let Some(modified) = last_modified(headers) {
            resource = resource.with_modified(modified);
        }
        Ok(resource)
    }

    /// `PUT Object` with an arbitrary body of known length
    async fn put_body(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        body: Body,
        length: u64,
    ) -> Result<Resource, CosError> {
        let url = self.client.object_url(ctx, key)?;
        let request = self
            .client
            .request(Method::PUT, url, &[])?
            .header(CONTENT_LENGTH, length)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body);
        let response = CosClient::send(request).await?;

        let mut resource = Resource::object(key.clone(), length, Vendor::TencentCos)
            .with_modified(last_modified(response.headers()).unwrap_or_else(Utc::now));
        if let Some(hash) = etag_hash(response.headers()) {
            resource = resource.with_hash(hash);
        }
        Ok(resource)
    }
}

#[async_trait::async_trait]
impl IProviderAdapter for CosProvider {
    fn vendor(&self) -> Vendor {
        Vendor::TencentCos
    }

    async fn list_page(
        &self,
        ctx: &BucketContext,
        request: &ListRequest,
    ) -> Result<ListPage, ProviderError> {
        let max_keys = request.limit.clamp(1, 1000).to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("prefix", request.prefix.as_str()),
            ("max-keys", max_keys.as_str()),
        ];
        if let Some(delimiter) = &request.delimiter {
            query.push(("delimiter", delimiter.as_str()));
        }
        let marker = request.cursor.as_ref().map(|c| c.as_str());
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }

        debug!(bucket = %ctx.name, prefix = %request.prefix, marker = ?marker, "CosProvider::list_page");
        let url = self.client.bucket_url(ctx)?;
        let response = CosClient::send(self.client.request(Method::GET, url, &query)?).await?;
        let body = response.text().await.map_err(CosError::from)?;
        Ok(xml::parse_list_result(&body, marker)?)
    }

    async fn get_acl(&self, ctx: &BucketContext) -> Result<Permission, ProviderError> {
        let url = self.client.bucket_url(ctx)?;
        let response =
            CosClient::send(self.client.request(Method::GET, url, &[("acl", "")])?).await?;
        let body = response.text().await.map_err(CosError::from)?;
        let permission = xml::parse_acl(&body)?;
        debug!(bucket = %ctx.name, permission = %permission.as_str(), "Bucket ACL");
        Ok(permission)
    }

    async fn get_domains(&self, ctx: &BucketContext) -> Result<Vec<String>, ProviderError> {
        let url = self.client.bucket_url(ctx)?;
        let request = self.client.request(Method::GET, url, &[("domain", "")])?;
        match CosClient::send(request).await {
            Ok(response) => {
                let body = response.text().await.map_err(CosError::from)?;
                Ok(xml::parse_domains(&body)?)
            }
            Err(CosError::Status { status, code, .. })
                if status == StatusCode::NOT_FOUND && code == NO_DOMAIN_CODE =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        body: ObjectBody,
        length: u64,
        progress: Option<ProgressSink>,
    ) -> Result<Resource, ProviderError> {
        let sent = Arc::new(AtomicU64::new(0));
        let stream = ReaderStream::new(body).map(move |chunk| {
            if let (Ok(bytes), Some(sink)) = (&chunk, &progress) {
                let total = sent.fetch_add(bytes.len() as u64, Ordering::SeqCst) + bytes.len() as u64;
                if length > 0 {
                    sink(total as f64 / length as f64);
                }
            }
            chunk
        });

        info!(bucket = %ctx.name, key = %key, length, "Uploading object");
        let resource = self
            .put_body(ctx, key, Body::wrap_stream(stream), length)
            .await?;
        Ok(resource)
    }

    async fn fetch_remote(
        &self,
        ctx: &BucketContext,
        source_url: &str,
        key: &ObjectKey,
    ) -> Result<Resource, ProviderError> {
        info!(bucket = %ctx.name, key = %key, source = %source_url, "Fetching remote URL");
        let response = self
            .client
            .http()
            .get(source_url)
            .send()
            .await
            .map_err(CosError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CosError::Status {
                status,
                code: "SourceUnavailable".into(),
                message: source_url.to_string(),
            }
            .into());
        }

        let resource = match response.content_length() {
            Some(length) => {
                self.put_body(ctx, key, Body::wrap_stream(response.bytes_stream()), length)
                    .await?
            }
            None => {
                let bytes = response.bytes().await.map_err(CosError::from)?;
                let length = bytes.len() as u64;
                self.put_body(ctx, key, Body::from(bytes), length).await?
            }
        };
        Ok(resource)
    }

    async fn delete_object(&self, ctx: &BucketContext, key: &ObjectKey) -> Result<(), ProviderError> {
        let url = self.client.object_url(ctx, key)?;
        match CosClient::send(self.client.request(Method::DELETE, url, &[])?).await {
            Ok(_) => Ok(()),
            Err(CosError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                debug!(key = %key, "Delete of missing object treated as success");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_objects(
        &self,
        ctx: &BucketContext,
        keys: &[ObjectKey],
    ) -> Result<HashMap<ObjectKey, Result<(), ProviderError>>, ProviderError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let body = xml::build_delete_request(keys);
        let content_md5 =
            base64::engine::general_purpose::STANDARD.encode(Md5::digest(body.as_bytes()));
        let url = self.client.bucket_url(ctx)?;
        let request = self
            .client
            .request(Method::POST, url, &[("delete", "")])?
            .header("Content-MD5", content_md5)
            .header(CONTENT_TYPE, "application/xml")
            .body(body);
        let response = CosClient::send(request).await?;
        let text = response.text().await.map_err(CosError::from)?;
        let (deleted, failed) = xml::parse_delete_result(&text)?;

        let mut results: HashMap<ObjectKey, Result<(), ProviderError>> = HashMap::with_capacity(keys.len());
        let deleted: std::collections::HashSet<&str> = deleted.iter().map(String::as_str).collect();
        let failures: HashMap<&str, &xml::DeleteFailure> =
            failed.iter().map(|f| (f.key.as_str(), f)).collect();

        for key in keys {
            let result = if let Some(failure) = failures.get(key.as_str()) {
                if failure.code == "NoSuchKey" {
                    Ok(())
                } else {
                    Err(delete_failure_error(failure))
                }
            } else if deleted.contains(key.as_str()) {
                Ok(())
            } else {
                Err(ProviderError::InvalidResponse(format!(
                    "batch delete did not report {key}"
                )))
            };
            results.insert(key.clone(), result);
        }

        let refused = results.values().filter(|r| r.is_err()).count();
        if refused > 0 {
            warn!(bucket = %ctx.name, refused, total = keys.len(), "Batch delete partially refused");
        }
        Ok(results)
    }

    async fn copy_object(
        &self,
        ctx: &BucketContext,
        source: &ObjectKey,
        target: &ObjectKey,
    ) -> Result<Resource, ProviderError> {
        let copy_source = format!(
            "{}/{}",
            CosClient::copy_source_host(ctx),
            urlencoding::encode(source.as_str()).replace("%2F", "/")
        );
        let url = self.client.object_url(ctx, target)?;
        let request = self
            .client
            .request(Method::PUT, url, &[])?
            .header("x-cos-copy-source", copy_source);
        let response = CosClient::send(request).await?;
        let body = response.text().await.map_err(CosError::from)?;
        let (hash, modified) = xml::parse_copy_result(&body)?;

        match self.head_object(ctx, target).await {
            Ok(resource) => Ok(resource),
            Err(e) => {
                warn!(key = %target, error = %e, "HEAD after copy failed; size unknown");
                let mut resource = Resource::object(target.clone(), 0, Vendor::TencentCos);
                if let Some(hash) = hash {
                    resource = resource.with_hash(hash);
                }
                if let Some(modified) = modified {
                    resource = resource.with_modified(modified);
                }
                Ok(resource)
            }
        }
    }

    fn sign_url(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        expiry: Duration,
        requires_signing: bool,
    ) -> Result<String, ProviderError> {
        if requires_signing {
            Ok(self.client.presign(ctx, key, expiry)?)
        } else {
            Ok(self.client.object_url(ctx, key)?.to_string())
        }
    }
}
