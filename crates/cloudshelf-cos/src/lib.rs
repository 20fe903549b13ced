//! CloudShelf COS - Tencent Cloud Object Storage adapter
//!
//! Provides an async client for the COS XML API:
//! - Request signing with the `q-sign` HMAC-SHA1 scheme
//! - Bucket listing, ACL and custom domain discovery
//! - Streamed uploads, server-side copy, single and batch deletes
//! - Fetch-by-URL relayed through the client
//!
//! ## Modules
//!
//! - [`auth`] - Credentials and request signing
//! - [`client`] - HTTP client with endpoint construction and error mapping
//! - [`xml`] - Minimal XML tree and the COS response documents
//! - [`provider`] - [`IProviderAdapter`](cloudshelf_core::ports::IProviderAdapter) implementation

pub mod auth;
pub mod client;
pub mod provider;
pub mod xml;

pub use auth::Credentials;
pub use client::CosClient;
pub use provider::CosProvider;

use cloudshelf_core::domain::ProviderError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to COS
#[derive(Debug, Error)]
pub enum CosError {
    /// COS answered with a non-success status
    #[error("COS returned {status} {code}: {message}")]
    Status {
        status: StatusCode,
        /// COS error code, e.g. `AccessDenied`
        code: String,
        message: String,
    },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The client was configured with unusable settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error codes COS uses when an account or request quota is exhausted
const QUOTA_CODES: &[&str] = &[
    "QuotaExceeded",
    "EntityTooLarge",
    "TooManyBuckets",
    "InsufficientStorage",
    "ExceedQuota",
];

impl From<CosError> for ProviderError {
    fn from(err: CosError) -> Self {
        match err {
            CosError::Status {
                status,
                code,
                message,
            } => {
                let detail = format!("{code}: {message}");
                if QUOTA_CODES.contains(&code.as_str()) || status == StatusCode::PAYLOAD_TOO_LARGE {
                    ProviderError::QuotaExceeded(detail)
                } else if status == StatusCode::TOO_MANY_REQUESTS
                    || status == StatusCode::REQUEST_TIMEOUT
                    || status.is_server_error()
                {
                    ProviderError::TransientNetwork(detail)
                } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    ProviderError::Permission(detail)
                } else if status == StatusCode::NOT_FOUND {
                    ProviderError::NotFound(detail)
                } else {
                    ProviderError::InvalidResponse(format!("{status} {detail}"))
                }
            }
            CosError::Network(e) => ProviderError::TransientNetwork(e.to_string()),
            CosError::InvalidResponse(msg) | CosError::InvalidConfig(msg) => {
                ProviderError::InvalidResponse(msg)
            }
        }
    }
}
