//! Resource entity
//!
//! A [`Resource`] is one entry of a bucket listing: either a stored object or
//! a synthetic directory derived from a common prefix. Directories are never
//! stored by the vendor, so they never carry a size, hash or timestamp.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentHash, ObjectKey};

/// Storage vendor a resource was listed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    /// Tencent Cloud Object Storage
    TencentCos,
    /// Process-local store used for dry runs and tests
    Memory,
}

impl Vendor {
    /// Stable lowercase name used in configuration and the persisted index
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TencentCos => "tencent_cos",
            Self::Memory => "memory",
        }
    }
}

impl Display for Vendor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tencent_cos" | "cos" | "tencent" => Ok(Self::TencentCos),
            "memory" => Ok(Self::Memory),
            other => Err(DomainError::UnknownVariant {
                kind: "vendor",
                value: other.to_string(),
            }),
        }
    }
}

/// A single object or synthetic directory in a bucket listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    key: ObjectKey,
    is_directory: bool,
    size: Option<u64>,
    modified: Option<DateTime<Utc>>,
    content_hash: Option<ContentHash>,
    vendor: Vendor,
}

impl Resource {
    /// Create a stored object
    #[must_use]
    pub fn object(key: ObjectKey, size: u64, vendor: Vendor) -> Self {
        Self {
            key,
            is_directory: false,
            size: Some(size),
            modified: None,
            content_hash: None,
            vendor,
        }
    }

    /// Create a synthetic directory from a common prefix
    ///
    /// # Errors
    /// Returns error if `prefix` does not end with the delimiter
    pub fn directory(prefix: ObjectKey, delimiter: &str, vendor: Vendor) -> Result<Self, DomainError> {
        if !prefix.is_directory_key(delimiter) {
            return Err(DomainError::InvalidKey(format!(
                "directory key must end with '{delimiter}': {prefix}"
            )));
        }
        Ok(Self {
            key: prefix,
            is_directory: true,
            size: None,
            modified: None,
            content_hash: None,
            vendor,
        })
    }

    /// Set the last-modified timestamp (ignored for directories)
    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        if !self.is_directory {
            self.modified = Some(modified);
        }
        self
    }

    /// Set the content hash (ignored for directories)
    #[must_use]
    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        if !self.is_directory {
            self.content_hash = Some(hash);
        }
        self
    }

    /// Reconstruct a resource from persisted fields
    ///
    /// Directory invariants are re-applied: a directory never keeps a size,
    /// timestamp or hash even if the stored row had one.
    #[must_use]
    pub fn from_parts(
        key: ObjectKey,
        is_directory: bool,
        size: Option<u64>,
        modified: Option<DateTime<Utc>>,
        content_hash: Option<ContentHash>,
        vendor: Vendor,
    ) -> Self {
        if is_directory {
            return Self {
                key,
                is_directory,
                size: None,
                modified: None,
                content_hash: None,
                vendor,
            };
        }
        Self {
            key,
            is_directory,
            size,
            modified,
            content_hash,
            vendor,
        }
    }

    /// Full remote key
    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// Returns true for synthetic directories
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Object size in bytes, `None` for directories
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Last modification time reported by the vendor
    #[must_use]
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    /// Content hash reported by the vendor
    #[must_use]
    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    /// Vendor the resource belongs to
    #[must_use]
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Last path segment
    #[must_use]
    pub fn name(&self, delimiter: &str) -> &str {
        self.key.name(delimiter)
    }

    /// Returns a copy of this resource under a different key
    #[must_use]
    pub fn with_key(&self, key: ObjectKey) -> Self {
        Self {
            key,
            ..self.clone()
        }
    }
}
