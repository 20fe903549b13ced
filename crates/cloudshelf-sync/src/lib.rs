//! CloudShelf Sync - Push a local folder into a bucket prefix
//!
//! Provides:
//! - Local and remote snapshots normalized to `/`-separated relative paths
//! - A deterministic folder diff producing a [`SyncPlan`](cloudshelf_core::domain::SyncPlan)
//! - Per-path merge policies matched by glob, first match wins
//! - A bounded-concurrency executor with cancellation and per-item outcomes
//!
//! ## Modules
//!
//! - [`snapshot`] - Local directory scanner and remote listing snapshot
//! - [`diff`] - Folder diff engine
//! - [`policy`] - Merge policy rules for changed paths
//! - [`executor`] - Applies a plan through the bucket and emits progress events
//! - [`engine`] - `FolderSync` session entry point

pub mod diff;
pub mod engine;
pub mod executor;
pub mod policy;
pub mod snapshot;

pub use diff::DiffEngine;
pub use engine::{sync_folder, FolderSync, PreparedSync};
pub use executor::{SyncEvent, SyncExecutor};
pub use policy::PolicyEngine;
pub use snapshot::{EntryState, LocalSnapshot, RemoteSnapshot};

use std::path::PathBuf;

use cloudshelf_core::bucket::BucketError;
use cloudshelf_core::domain::DomainError;
use thiserror::Error;

/// Errors that abort a whole sync run
///
/// Failures of individual transfers are not errors; they are recorded in
/// the [`SyncReport`](cloudshelf_core::domain::SyncReport).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local tree could not be scanned
    #[error("Failed to scan {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote prefix could not be listed
    #[error("Failed to list remote prefix '{prefix}': {source}")]
    Listing {
        prefix: String,
        #[source]
        source: BucketError,
    },

    /// An I/O error occurred outside the scan
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A domain-level error propagated from cloudshelf-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}
