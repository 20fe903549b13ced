//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for identifiers and values
//! that cross the provider boundary. Each newtype ensures data validity at
//! construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Default key delimiter used to synthesize directories
pub const DEFAULT_DELIMITER: &str = "/";

// ============================================================================
// BucketId
// ============================================================================

/// Identifier for a bound bucket within one host session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(Uuid);

impl BucketId {
    /// Create a new random BucketId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable id for a vendor bucket, the same in every session
    ///
    /// Used to key the persisted index so that separate runs against the
    /// same bucket share their entries.
    #[must_use]
    pub fn for_location(vendor: &str, region: &str, name: &str) -> Self {
        let location = format!("{vendor}://{region}/{name}");
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, location.as_bytes()))
    }

    /// Create a BucketId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BucketId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BucketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BucketId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid BucketId: {e}")))
    }
}

// ============================================================================
// ObjectKey
// ============================================================================

/// Full remote path of an object or synthetic directory inside a bucket
///
/// Keys are relative to the bucket root: they never start with a slash.
/// A key that ends with the delimiter denotes a directory (common prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Create a new ObjectKey
    ///
    /// # Errors
    /// Returns error if the key is empty, starts with `/` or contains NUL
    pub fn new(key: String) -> Result<Self, DomainError> {
        if key.is_empty() {
            return Err(DomainError::InvalidKey("key cannot be empty".to_string()));
        }

        if key.starts_with('/') {
            return Err(DomainError::InvalidKey(format!(
                "key must be relative to the bucket root: {key}"
            )));
        }

        if key.contains('\0') {
            return Err(DomainError::InvalidKey(format!(
                "key contains a NUL byte: {key:?}"
            )));
        }

        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key names a directory (ends with the delimiter)
    #[must_use]
    pub fn is_directory_key(&self, delimiter: &str) -> bool {
        self.0.ends_with(delimiter)
    }

    /// Last path segment, without the trailing delimiter for directories
    #[must_use]
    pub fn name(&self, delimiter: &str) -> &str {
        let trimmed = self.0.strip_suffix(delimiter).unwrap_or(&self.0);
        match trimmed.rfind(delimiter) {
            Some(idx) => &trimmed[idx + delimiter.len()..],
            None => trimmed,
        }
    }

    /// Prefix of the containing directory, including its trailing delimiter
    ///
    /// Top-level keys return an empty prefix.
    #[must_use]
    pub fn parent_prefix(&self, delimiter: &str) -> &str {
        let trimmed = self.0.strip_suffix(delimiter).unwrap_or(&self.0);
        match trimmed.rfind(delimiter) {
            Some(idx) => &trimmed[..idx + delimiter.len()],
            None => "",
        }
    }

    /// Returns true if this key lies strictly below `prefix`
    ///
    /// `prefix` is treated as a directory: `a/b` and `a/b/` both match
    /// `a/b/c` but never `a/bx`.
    #[must_use]
    pub fn is_descendant_of(&self, prefix: &str, delimiter: &str) -> bool {
        let dir = directory_prefix(prefix, delimiter);
        if dir.is_empty() {
            return true;
        }
        self.0.len() > dir.len() && self.0.starts_with(dir.as_str())
    }

    /// Rewrite the `old` directory prefix into `new`
    ///
    /// Returns `None` when the key is not a descendant of `old`.
    #[must_use]
    pub fn rebase(&self, old: &str, new: &str, delimiter: &str) -> Option<Self> {
        if !self.is_descendant_of(old, delimiter) {
            return None;
        }
        let old_dir = directory_prefix(old, delimiter);
        let new_dir = directory_prefix(new, delimiter);
        let rest = &self.0[old_dir.len()..];
        Self::new(format!("{new_dir}{rest}")).ok()
    }

    /// Replace the last path segment, keeping the directory marker if present
    ///
    /// # Errors
    /// Returns error if `new_name` is empty or contains the delimiter
    pub fn with_name(&self, new_name: &str, delimiter: &str) -> Result<Self, DomainError> {
        if new_name.is_empty() || new_name.contains(delimiter) {
            return Err(DomainError::InvalidKey(format!(
                "invalid name segment: {new_name}"
            )));
        }
        let suffix = if self.is_directory_key(delimiter) {
            delimiter
        } else {
            ""
        };
        Self::new(format!(
            "{}{new_name}{suffix}",
            self.parent_prefix(delimiter)
        ))
    }
}

/// Normalize a prefix so that it ends with the delimiter (empty stays empty)
#[must_use]
pub fn directory_prefix(prefix: &str, delimiter: &str) -> String {
    if prefix.is_empty() || prefix.ends_with(delimiter) {
        prefix.to_string()
    } else {
        format!("{prefix}{delimiter}")
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Opaque vendor pagination token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Create a new Cursor
    ///
    /// # Errors
    /// Returns error if the token is empty
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.is_empty() {
            return Err(DomainError::InvalidCursor(
                "cursor cannot be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// Content fingerprint as reported by the vendor (ETag) or computed locally
///
/// Surrounding quotes are stripped and the digest is lowercased. Multipart
/// ETags (`<hex>-<parts>`) are accepted but are not plain MD5 digests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Create a new ContentHash
    ///
    /// # Errors
    /// Returns error if the value is empty or not a hex digest
    pub fn new(hash: String) -> Result<Self, DomainError> {
        let normalized = hash.trim().trim_matches('"').to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::InvalidHash("hash cannot be empty".to_string()));
        }
        if !normalized
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-')
        {
            return Err(DomainError::InvalidHash(format!(
                "expected hex digest, got: {hash}"
            )));
        }
        Ok(Self(normalized))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the value is a plain 128-bit MD5 digest
    #[must_use]
    pub fn is_md5(&self) -> bool {
        self.0.len() == 32 && !self.0.contains('-')
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

// ============================================================================
// Tests
// ============================================================================
