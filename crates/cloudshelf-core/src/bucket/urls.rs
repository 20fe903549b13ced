//! Download URL generation
//!
//! Signing is delegated to the adapter; the bucket decides whether a
//! signature is needed (private ACL) and which host to expose (the most
//! recently used bound domain, if any).

use std::time::Duration;

use url::Url;

use super::{Bucket, BucketError};
use crate::domain::errors::ProviderError;
use crate::domain::newtypes::ObjectKey;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "ico"];

/// Presentation of a generated URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlFormat {
    /// The bare URL
    #[default]
    Plain,
    /// A Markdown link; images use the inline image syntax
    Markdown,
}

impl UrlFormat {
    /// Render `url` for the object named `name`
    #[must_use]
    pub fn render(&self, name: &str, url: &str) -> String {
        match self {
            Self::Plain => url.to_string(),
            Self::Markdown => {
                let is_image = name
                    .rsplit_once('.')
                    .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
                if is_image {
                    format!("![{name}]({url})")
                } else {
                    format!("[{name}]({url})")
                }
            }
        }
    }
}

/// Replace scheme-less `domain` as the host of `url`, keeping path and query
fn rewrite_host(url: &str, domain: &str) -> Result<String, ProviderError> {
    let mut parsed =
        Url::parse(url).map_err(|e| ProviderError::InvalidResponse(format!("{url}: {e}")))?;
    parsed
        .set_host(Some(domain))
        .map_err(|e| ProviderError::InvalidResponse(format!("{domain}: {e}")))?;
    parsed
        .set_port(None)
        .map_err(|()| ProviderError::InvalidResponse(format!("cannot clear port of {url}")))?;
    Ok(parsed.to_string())
}

impl Bucket {
    /// Download URL for `key`
    ///
    /// Signed when the bucket is private. When a custom domain is bound, the
    /// vendor host is replaced by the most recently used domain.
    pub fn generate_url(&self, key: &ObjectKey, expiry: Option<Duration>) -> Result<String, BucketError> {
        let expiry = expiry.unwrap_or(self.settings.default_expiry);
        let url = self.adapter.sign_url(
            &self.context,
            key,
            expiry,
            self.permission.requires_signing(),
        )?;

        match self.domains.primary() {
            Some(domain) => Ok(rewrite_host(&url, domain)?),
            None => Ok(url),
        }
    }

    /// Formatted URLs for every selected object, in key order
    ///
    /// Directories in the selection are skipped.
    pub fn selection_urls(
        &self,
        expiry: Option<Duration>,
        format: UrlFormat,
    ) -> Result<Vec<String>, BucketError> {
        let delimiter = self.delimiter();
        self.selection
            .iter()
            .filter(|key| !key.is_directory_key(delimiter))
            .map(|key| {
                let url = self.generate_url(key, expiry)?;
                Ok(format.render(key.name(delimiter), &url))
            })
            .collect()
    }
}
