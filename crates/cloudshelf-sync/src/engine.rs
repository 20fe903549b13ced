//! Folder synchronization sessions
//!
//! [`FolderSync`] pushes a local directory into a bucket prefix:
//!
//! 1. **Snapshot**: scan the local tree and list the remote prefix
//!    recursively. Failure of either step fails the whole call
//! 2. **Diff**: compute the [`SyncPlan`] for the configured merge type
//! 3. **Execute**: apply the plan with the merge policy, bounded
//!    concurrency and per-operation outcomes
//!
//! Only the local side is authoritative; nothing is ever downloaded.

use std::path::Path;

use cloudshelf_core::bucket::Bucket;
use cloudshelf_core::config::SyncConfig;
use cloudshelf_core::domain::{MergePolicy, MergeType, SyncPlan, SyncReport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::diff::DiffEngine;
use crate::executor::{SyncEvent, SyncExecutor};
use crate::policy::PolicyEngine;
use crate::snapshot::{LocalSnapshot, RemoteSnapshot};
use crate::SyncError;

/// Result of the snapshot and diff phases
#[derive(Debug, Clone)]
pub struct PreparedSync {
    pub plan: SyncPlan,
    pub local: LocalSnapshot,
    pub remote: RemoteSnapshot,
}

/// Settings of a folder sync
#[derive(Debug, Clone)]
pub struct FolderSync {
    merge_type: MergeType,
    policy: PolicyEngine,
    /// `None` uses the bucket's concurrency setting
    concurrency: Option<usize>,
    hash_local_files: bool,
}

impl FolderSync {
    pub fn new(merge_type: MergeType, policy: PolicyEngine) -> Self {
        Self {
            merge_type,
            policy,
            concurrency: None,
            hash_local_files: true,
        }
    }

    /// Settings from the `sync` configuration section
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            merge_type: config.merge_type,
            policy: PolicyEngine::from_config(config),
            concurrency: Some(config.concurrency),
            hash_local_files: config.hash_local_files,
        }
    }

    #[must_use]
    pub fn with_merge_type(mut self, merge_type: MergeType) -> Self {
        self.merge_type = merge_type;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Compare local and remote by size and time only
    #[must_use]
    pub fn with_hashing(mut self, hash_local_files: bool) -> Self {
        self.hash_local_files = hash_local_files;
        self
    }

    pub fn merge_type(&self) -> MergeType {
        self.merge_type
    }

    /// Snapshot both sides and compute the plan without changing anything
    ///
    /// # Errors
    /// [`SyncError::Snapshot`] if the local scan fails,
    /// [`SyncError::Listing`] if the remote listing fails
    #[tracing::instrument(skip(self, bucket, cancel), fields(bucket = %bucket.name()))]
    pub async fn prepare(
        &self,
        local_root: &Path,
        bucket: &Bucket,
        remote_prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<PreparedSync, SyncError> {
        let local = LocalSnapshot::scan(local_root, self.hash_local_files).await?;

        let listed = bucket
            .collect_descendants(remote_prefix, cancel)
            .await
            .map_err(|source| SyncError::Listing {
                prefix: remote_prefix.to_string(),
                source,
            })?;
        let remote = RemoteSnapshot::from_resources(remote_prefix, bucket.delimiter(), &listed);

        let plan = DiffEngine::new(self.merge_type).diff(&local, &remote);
        Ok(PreparedSync {
            plan,
            local,
            remote,
        })
    }

    /// Run a full sync of `local_root` into `remote_prefix`
    ///
    /// Individual transfer failures are reported in the returned
    /// [`SyncReport`], never as an error.
    ///
    /// # Errors
    /// Returns error only if a snapshot step fails
    #[tracing::instrument(skip(self, bucket, events, cancel), fields(bucket = %bucket.name()))]
    pub async fn run(
        &self,
        local_root: &Path,
        bucket: &mut Bucket,
        remote_prefix: &str,
        events: Option<mpsc::UnboundedSender<SyncEvent>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let PreparedSync {
            plan,
            local,
            remote,
        } = self.prepare(local_root, bucket, remote_prefix, cancel).await?;

        info!(
            local_files = local.len(),
            remote_objects = remote.len(),
            operations = plan.len(),
            merge_type = %self.merge_type,
            "Starting folder sync"
        );

        let mut executor = SyncExecutor::new(self.policy.clone()).with_concurrency(
            self.concurrency
                .unwrap_or_else(|| bucket.settings().concurrency),
        );
        if let Some(events) = events {
            executor = executor.with_events(events);
        }

        Ok(executor
            .execute(plan, &local, &remote, bucket, cancel)
            .await)
    }
}

/// Push `local_root` into `remote_prefix` with one merge policy for every path
///
/// Convenience wrapper around [`FolderSync::run`] using the bucket's
/// concurrency and content hashing.
pub async fn sync_folder(
    local_root: &Path,
    bucket: &mut Bucket,
    remote_prefix: &str,
    merge_type: MergeType,
    policy: MergePolicy,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError> {
    FolderSync::new(merge_type, PolicyEngine::new(policy, &[]))
        .run(local_root, bucket, remote_prefix, events, cancel)
        .await
}
