//! Local and remote snapshots
//!
//! Both sides of a sync are reduced to a map of relative path to
//! [`EntryState`]. Paths use `/` as separator whatever the platform or the
//! bucket delimiter, and only leaves are recorded: directories exist
//! implicitly through the paths below them.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::{DateTime, Utc};
use cloudshelf_core::domain::{directory_prefix, DomainError, ObjectKey, Resource};
use md5::{Digest, Md5};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

use crate::SyncError;

const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Comparable state of one file or stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryState {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Lower-case hex MD5 of the content, when known
    pub hash: Option<String>,
}

impl EntryState {
    #[must_use]
    pub fn new(size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            size,
            modified,
            hash: None,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into().to_ascii_lowercase());
        self
    }
}

/// Streamed MD5 of a local file, as lower-case hex
pub async fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ============================================================================
// LocalSnapshot
// ============================================================================

/// Files below a local root
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    root: PathBuf,
    entries: BTreeMap<String, EntryState>,
}

impl LocalSnapshot {
    /// Walk `root` recursively, recording every regular file
    ///
    /// Symbolic links and non UTF-8 names are skipped. Files that vanish
    /// while the walk is running are ignored.
    ///
    /// # Errors
    /// Returns [`SyncError::Snapshot`] if `root` is missing, is not a
    /// directory or any directory below it cannot be read
    #[tracing::instrument]
    pub async fn scan(root: &Path, hash_files: bool) -> Result<Self, SyncError> {
        let snapshot_err = |source: io::Error| SyncError::Snapshot {
            path: root.to_path_buf(),
            source,
        };

        let metadata = tokio::fs::metadata(root).await.map_err(snapshot_err)?;
        if !metadata.is_dir() {
            return Err(snapshot_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }

        let mut entries = BTreeMap::new();
        walk_directory(root.to_path_buf(), String::new(), hash_files, &mut entries).await?;

        debug!(root = %root.display(), files = entries.len(), "Local scan complete");
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    /// Build a snapshot from known entries without touching the disk
    pub fn from_entries(
        root: impl Into<PathBuf>,
        entries: impl IntoIterator<Item = (String, EntryState)>,
    ) -> Self {
        Self {
            root: root.into(),
            entries: entries.into_iter().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn get(&self, relative: &str) -> Option<&EntryState> {
        self.entries.get(relative)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntryState)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filesystem path of a relative entry path
    #[must_use]
    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

/// Recursively walks `dir`, inserting files under `relative`
fn walk_directory<'a>(
    dir: PathBuf,
    relative: String,
    hash_files: bool,
    entries: &'a mut BTreeMap<String, EntryState>,
) -> Pin<Box<dyn Future<Output = Result<(), SyncError>> + Send + 'a>> {
    Box::pin(async move {
        let scan_err = |source: io::Error| SyncError::Snapshot {
            path: dir.clone(),
            source,
        };

        let mut reader = tokio::fs::read_dir(&dir).await.map_err(scan_err)?;
        while let Some(entry) = reader.next_entry().await.map_err(scan_err)? {
            let path = entry.path();
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!(name = ?raw, dir = %dir.display(), "Skipping non UTF-8 file name");
                    continue;
                }
            };
            let entry_relative = if relative.is_empty() {
                name
            } else {
                format!("{relative}/{name}")
            };

            let file_type = entry.file_type().await.map_err(scan_err)?;
            if file_type.is_symlink() {
                debug!(path = %path.display(), "Skipping symbolic link");
                continue;
            }

            if file_type.is_dir() {
                walk_directory(path, entry_relative, hash_files, entries).await?;
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            match file_state(&path, hash_files).await {
                Ok(state) => {
                    trace!(path = %entry_relative, size = state.size, "Scanned file");
                    entries.insert(entry_relative, state);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "File vanished during scan");
                }
                Err(source) => return Err(SyncError::Snapshot { path, source }),
            }
        }

        Ok(())
    })
}

async fn file_state(path: &Path, hash_files: bool) -> io::Result<EntryState> {
    let metadata = tokio::fs::metadata(path).await?;
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let mut state = EntryState::new(metadata.len(), modified);
    if hash_files {
        state.hash = Some(md5_file(path).await?);
    }
    Ok(state)
}

// ============================================================================
// RemoteSnapshot
// ============================================================================

/// Objects below a remote prefix
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    /// Normalized prefix, empty or ending with the delimiter
    prefix: String,
    delimiter: String,
    entries: BTreeMap<String, EntryState>,
}

impl RemoteSnapshot {
    /// Build a snapshot from a recursive listing of `prefix`
    ///
    /// Synthetic directories, directory marker objects and keys outside the
    /// prefix are ignored. Only plain MD5 ETags are kept as hashes;
    /// multipart ETags do not describe the content digest.
    #[must_use]
    pub fn from_resources(prefix: &str, delimiter: &str, resources: &[Resource]) -> Self {
        let dir = directory_prefix(prefix, delimiter);
        let mut entries = BTreeMap::new();

        for resource in resources.iter().filter(|r| !r.is_directory()) {
            let Some(rest) = resource.key().as_str().strip_prefix(dir.as_str()) else {
                continue;
            };
            if rest.is_empty() || rest.ends_with(delimiter) {
                continue;
            }
            let state = EntryState {
                size: resource.size().unwrap_or(0),
                modified: resource.modified(),
                hash: resource
                    .content_hash()
                    .filter(|h| h.is_md5())
                    .map(|h| h.as_str().to_string()),
            };
            entries.insert(to_relative(rest, delimiter), state);
        }

        Self {
            prefix: dir,
            delimiter: delimiter.to_string(),
            entries,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn get(&self, relative: &str) -> Option<&EntryState> {
        self.entries.get(relative)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntryState)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object key a relative path maps to under this prefix
    ///
    /// # Errors
    /// Returns error if the resulting key is not a valid object key
    pub fn key_for(&self, relative: &str) -> Result<ObjectKey, DomainError> {
        let rest = if self.delimiter == "/" {
            relative.to_string()
        } else {
            relative.replace('/', &self.delimiter)
        };
        ObjectKey::new(format!("{}{rest}", self.prefix))
    }
}

fn to_relative(rest: &str, delimiter: &str) -> String {
    if delimiter == "/" {
        rest.to_string()
    } else {
        rest.replace(delimiter, "/")
    }
}
