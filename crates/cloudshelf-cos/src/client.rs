//! COS HTTP client
//!
//! Builds bucket and object URLs, signs every request and turns COS error
//! documents into [`CosError::Status`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloudshelf_cos::{CosClient, Credentials};
//!
//! # fn example() -> Result<(), cloudshelf_cos::CosError> {
//! let client = CosClient::new(Credentials::from_env()?)?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use cloudshelf_core::domain::ObjectKey;
use cloudshelf_core::ports::BucketContext;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::auth::{Credentials, SignRequest, SignWindow, Signer};
use crate::{xml, CosError};

/// Default HTTP timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifetime of the signature attached to a single API request
const REQUEST_SIGN_LIFETIME: Duration = Duration::from_secs(600);

/// Header carrying an STS session token
const SECURITY_TOKEN_HEADER: &str = "x-cos-security-token";

/// How bucket URLs are formed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `https://{bucket}.cos.{region}.myqcloud.com/{key}`
    VirtualHosted,
    /// `{base}/{bucket}/{key}`, used for gateways and tests
    PathStyle(Url),
}

/// Percent-encode a key, keeping `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `Host` header value as reqwest will send it
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Signed HTTP client for the COS XML API
#[derive(Debug, Clone)]
pub struct CosClient {
    http: Client,
    signer: Signer,
    endpoint: Endpoint,
}

impl CosClient {
    /// Creates a client for the public COS endpoints
    pub fn new(credentials: Credentials) -> Result<Self, CosError> {
        Self::with_timeout(credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(credentials: Credentials, timeout: Duration) -> Result<Self, CosError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            signer: Signer::new(credentials),
            endpoint: Endpoint::VirtualHosted,
        })
    }

    /// Route every request to a path-style endpoint (useful for testing)
    pub fn with_endpoint(mut self, base_url: &str) -> Result<Self, CosError> {
        let base = Url::parse(base_url)
            .map_err(|e| CosError::InvalidConfig(format!("endpoint {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CosError::InvalidConfig(format!(
                "endpoint {base_url} cannot hold a path"
            )));
        }
        self.endpoint = Endpoint::PathStyle(base);
        Ok(self)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Unsigned client, used to download fetch-by-URL sources
    pub fn http(&self) -> &Client {
        &self.http
    }

    // ========================================================================
    // URLs
    // ========================================================================

    /// Host COS uses in `x-cos-copy-source`
    pub fn copy_source_host(ctx: &BucketContext) -> String {
        format!("{}.cos.{}.myqcloud.com", ctx.name, ctx.region)
    }

    /// URL of the bucket root, ending with `/`
    pub fn bucket_url(&self, ctx: &BucketContext) -> Result<Url, CosError> {
        self.url_for(ctx, "")
    }

    /// URL of one object
    pub fn object_url(&self, ctx: &BucketContext, key: &ObjectKey) -> Result<Url, CosError> {
        self.url_for(ctx, &encode_key(key.as_str()))
    }

    fn url_for(&self, ctx: &BucketContext, encoded_key: &str) -> Result<Url, CosError> {
        let raw = match &self.endpoint {
            Endpoint::VirtualHosted => format!(
                "https://{}/{encoded_key}",
                Self::copy_source_host(ctx)
            ),
            Endpoint::PathStyle(base) => format!(
                "{}/{}/{encoded_key}",
                base.as_str().trim_end_matches('/'),
                urlencoding::encode(&ctx.name)
            ),
        };
        Url::parse(&raw).map_err(|e| CosError::InvalidConfig(format!("{raw}: {e}")))
    }

    // ========================================================================
    // Signing
    // ========================================================================

    fn sign_parts(
        &self,
        method: &Method,
        url: &Url,
        window: SignWindow,
    ) -> Result<Vec<(&'static str, String)>, CosError> {
        let path = urlencoding::decode(url.path())
            .map_err(|e| CosError::InvalidConfig(format!("non UTF-8 path {}: {e}", url.path())))?;
        let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let headers = vec![("host".to_string(), host_header(url))];
        self.signer.sign(
            &SignRequest {
                method: method.as_str(),
                path: &path,
                params: &params,
                headers: &headers,
            },
            window,
        )
    }

    /// Creates a signed request builder for `url` with `query` appended
    ///
    /// Query parameters must be complete before signing, so they are taken
    /// here rather than through [`RequestBuilder::query`].
    pub fn request(
        &self,
        method: Method,
        mut url: Url,
        query: &[(&str, &str)],
    ) -> Result<RequestBuilder, CosError> {
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }

        let authorization = self
            .sign_parts(&method, &url, SignWindow::from_now(REQUEST_SIGN_LIFETIME))?
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        debug!(method = %method, url = %url, "COS request");
        let mut builder = self
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, authorization);
        if let Some(token) = self.signer.credentials().session_token() {
            builder = builder.header(SECURITY_TOKEN_HEADER, token);
        }
        Ok(builder)
    }

    /// Sends a request and converts non-success statuses into errors
    pub async fn send(builder: RequestBuilder) -> Result<Response, CosError> {
        let response = builder.send().await?;
        Self::check(response).await
    }

    /// Pass successful responses through; parse the COS error document
    /// of anything else
    pub async fn check(response: Response) -> Result<Response, CosError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let (code, message) = xml::parse_error(&body).unwrap_or_else(|| {
            (
                status.canonical_reason().unwrap_or("Unknown").replace(' ', ""),
                body.chars().take(200).collect(),
            )
        });
        debug!(status = %status, code = %code, "COS error response");
        Err(CosError::Status {
            status,
            code,
            message,
        })
    }

    /// Presigned GET URL for `key`, valid for `expiry`
    pub fn presign(
        &self,
        ctx: &BucketContext,
        key: &ObjectKey,
        expiry: Duration,
    ) -> Result<String, CosError> {
        let mut url = self.object_url(ctx, key)?;
        let window = SignWindow::from_now(expiry);
        let parts = self.sign_parts(&Method::GET, &url, window)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &parts {
                pairs.append_pair(k, v);
            }
            if let Some(token) = self.signer.credentials().session_token() {
                pairs.append_pair(SECURITY_TOKEN_HEADER, token);
            }
        }
        Ok(url.to_string())
    }
}
