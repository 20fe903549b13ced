//! Sync executor
//!
//! Applies a [`SyncPlan`] to a bucket:
//!
//! 1. `Skip` operations, and `Update` operations the merge policy declines,
//!    are reported as skipped without any vendor call
//! 2. `Add` and `Update` upload the local file, at most `concurrency`
//!    transfers at a time. Transfers below a prefix the bucket recently
//!    moved share one lane and run in order
//! 3. All `Delete` operations go through one bulk removal
//!
//! Every operation ends with exactly one outcome. A failed transfer never
//! stops the others. Cancellation marks operations that have not started
//! as aborted; calls already issued run to completion.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cloudshelf_core::bucket::{Bucket, BucketHandle};
use cloudshelf_core::domain::{
    ItemOutcome, ObjectKey, OperationKind, ProviderError, Resource, SyncOperation, SyncPlan,
    SyncReport,
};
use cloudshelf_core::ports::ProgressSink;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::policy::{PolicyEngine, UpdateDecision};
use crate::snapshot::{LocalSnapshot, RemoteSnapshot};

/// Transfers run at once when nothing else is configured
pub const DEFAULT_CONCURRENCY: usize = 4;

// ============================================================================
// SyncEvent
// ============================================================================

/// Progress notifications emitted while a plan executes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Execution began; `total` operations will be reported
    Started { total: usize },
    /// Upload progress of one path, non-decreasing within `[0, 1]`
    TransferProgress { path: String, fraction: f64 },
    /// One operation reached its outcome
    OperationFinished {
        path: String,
        kind: OperationKind,
        outcome: String,
        /// Operations finished so far, this one included
        completed: usize,
        total: usize,
    },
    /// Every operation has an outcome
    Finished {
        completed: usize,
        failed: usize,
        aborted: usize,
        total: usize,
    },
}

/// Counts finished operations and forwards events to the host
struct Progress {
    total: usize,
    finished: AtomicUsize,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl Progress {
    fn new(total: usize, events: Option<mpsc::UnboundedSender<SyncEvent>>) -> Self {
        Self {
            total,
            finished: AtomicUsize::new(0),
            events,
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                trace!("Sync event receiver dropped");
            }
        }
    }

    fn operation_finished(&self, operation: &SyncOperation, outcome: &ItemOutcome) {
        let completed = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            path = %operation.path,
            kind = %operation.kind,
            outcome = outcome.label(),
            completed,
            total = self.total,
            "Operation finished"
        );
        self.emit(SyncEvent::OperationFinished {
            path: operation.path.clone(),
            kind: operation.kind,
            outcome: outcome.label().to_string(),
            completed,
            total: self.total,
        });
    }

    fn transfer_sink(&self, path: &str) -> Option<ProgressSink> {
        let tx = self.events.clone()?;
        let path = path.to_string();
        Some(Arc::new(move |fraction: f64| {
            let event = SyncEvent::TransferProgress {
                path: path.clone(),
                fraction,
            };
            if tx.send(event).is_err() {
                trace!(path = %path, "Sync event receiver dropped");
            }
        }))
    }
}

/// One upload
#[derive(Debug)]
struct Transfer {
    operation: SyncOperation,
    key: ObjectKey,
    source: PathBuf,
}

type TransferResult = (SyncOperation, ItemOutcome, Option<Resource>);

/// Group items into lanes; items sharing a lane id run in one lane, in order
///
/// Shared lanes come first so the longest sequential work starts early.
fn into_lanes<T>(items: Vec<T>, lane_of: impl Fn(&T) -> Option<usize>) -> Vec<Vec<T>> {
    let mut shared: BTreeMap<usize, Vec<T>> = BTreeMap::new();
    let mut independent = Vec::new();
    for item in items {
        match lane_of(&item) {
            Some(lane) => shared.entry(lane).or_default().push(item),
            None => independent.push(vec![item]),
        }
    }
    let mut lanes: Vec<Vec<T>> = shared.into_values().collect();
    lanes.extend(independent);
    lanes
}

// ============================================================================
// SyncExecutor
// ============================================================================

/// Executes sync plans against a bucket
#[derive(Debug, Clone)]
pub struct SyncExecutor {
    policy: PolicyEngine,
    concurrency: usize,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
}

impl SyncExecutor {
    pub fn new(policy: PolicyEngine) -> Self {
        Self {
            policy,
            concurrency: DEFAULT_CONCURRENCY,
            events: None,
        }
    }

    /// Limit the number of simultaneous transfers (at least one)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Send [`SyncEvent`]s to `events`
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    /// Execute `plan`, uploading from `local` into the prefix of `remote`
    ///
    /// Never fails as a whole: the report holds one entry per operation.
    #[tracing::instrument(skip_all, fields(bucket = %bucket.name(), operations = plan.len()))]
    pub async fn execute(
        &self,
        plan: SyncPlan,
        local: &LocalSnapshot,
        remote: &RemoteSnapshot,
        bucket: &mut Bucket,
        cancel: &CancellationToken,
    ) -> SyncReport {
        let start = Instant::now();
        let progress = Progress::new(plan.len(), self.events.clone());
        progress.emit(SyncEvent::Started { total: plan.len() });

        let mut report = SyncReport::new();
        let mut transfers = Vec::new();
        let mut deletes = Vec::new();

        for operation in plan.into_operations() {
            if operation.kind == OperationKind::Skip
                || (operation.kind == OperationKind::Update
                    && self.keeps_remote(&operation.path, local, remote))
            {
                record(&mut report, &progress, operation, ItemOutcome::Skipped);
                continue;
            }

            let key = match remote.key_for(&operation.path) {
                Ok(key) => key,
                Err(e) => {
                    warn!(path = %operation.path, error = %e, "No valid object key for path");
                    let outcome = ItemOutcome::Failed(ProviderError::LocalIo(format!(
                        "{}: {e}",
                        operation.path
                    )));
                    record(&mut report, &progress, operation, outcome);
                    continue;
                }
            };

            if operation.kind == OperationKind::Delete {
                deletes.push((operation, key));
            } else {
                transfers.push(Transfer {
                    source: local.absolute_path(&operation.path),
                    operation,
                    key,
                });
            }
        }

        let lanes = into_lanes(transfers, |t| bucket.moved_prefix_lane(t.key.as_str()));
        let results = self
            .run_transfers(lanes, bucket.transfer_handle(), &progress, cancel)
            .await;

        let mut uploaded = Vec::new();
        for (operation, outcome, resource) in results {
            uploaded.extend(resource);
            report.push(operation, outcome);
        }
        if !uploaded.is_empty() {
            bucket.record_uploaded(&uploaded).await;
        }

        self.run_deletes(deletes, bucket, &progress, &mut report, cancel)
            .await;

        report.sort();
        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        progress.emit(SyncEvent::Finished {
            completed: report.completed(),
            failed: report.failed(),
            aborted: report.aborted(),
            total: report.total(),
        });
        info!(
            total = report.total(),
            completed = report.completed(),
            failed = report.failed(),
            aborted = report.aborted(),
            duration_ms = report.duration_ms,
            "Sync plan executed"
        );
        report
    }

    fn keeps_remote(&self, path: &str, local: &LocalSnapshot, remote: &RemoteSnapshot) -> bool {
        match (local.get(path), remote.get(path)) {
            (Some(l), Some(r)) => self.policy.decide(path, l, r) == UpdateDecision::Keep,
            _ => false,
        }
    }

    async fn run_transfers(
        &self,
        lanes: Vec<Vec<Transfer>>,
        handle: BucketHandle,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Vec<TransferResult> {
        let handle = &handle;
        let per_lane: Vec<Vec<TransferResult>> = stream::iter(lanes)
            .map(|lane| async move {
                let mut results = Vec::with_capacity(lane.len());
                for transfer in lane {
                    let (outcome, resource) = upload(handle, &transfer, progress, cancel).await;
                    progress.operation_finished(&transfer.operation, &outcome);
                    results.push((transfer.operation, outcome, resource));
                }
                results
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        per_lane.into_iter().flatten().collect()
    }

    async fn run_deletes(
        &self,
        deletes: Vec<(SyncOperation, ObjectKey)>,
        bucket: &mut Bucket,
        progress: &Progress,
        report: &mut SyncReport,
        cancel: &CancellationToken,
    ) {
        if deletes.is_empty() {
            return;
        }
        if cancel.is_cancelled() {
            for (operation, _) in deletes {
                record(report, progress, operation, ItemOutcome::Aborted);
            }
            return;
        }

        let keys: Vec<ObjectKey> = deletes.iter().map(|(_, key)| key.clone()).collect();
        let bulk = bucket.remove_resources(&keys, cancel).await;
        for (operation, key) in deletes {
            let outcome = bulk.outcome_of(key.as_str()).cloned().unwrap_or_else(|| {
                ItemOutcome::Failed(ProviderError::InvalidResponse(format!(
                    "no outcome reported for {key}"
                )))
            });
            record(report, progress, operation, outcome);
        }
    }
}

fn record(
    report: &mut SyncReport,
    progress: &Progress,
    operation: SyncOperation,
    outcome: ItemOutcome,
) {
    progress.operation_finished(&operation, &outcome);
    report.push(operation, outcome);
}

async fn upload(
    handle: &BucketHandle,
    transfer: &Transfer,
    progress: &Progress,
    cancel: &CancellationToken,
) -> (ItemOutcome, Option<Resource>) {
    if cancel.is_cancelled() {
        return (ItemOutcome::Aborted, None);
    }
    let sink = progress.transfer_sink(&transfer.operation.path);
    match handle
        .put_file(&transfer.key, &transfer.source, sink, cancel)
        .await
    {
        Ok(resource) => (ItemOutcome::Succeeded, Some(resource)),
        Err(ProviderError::Aborted) => (ItemOutcome::Aborted, None),
        Err(e) => {
            warn!(path = %transfer.operation.path, error = %e, "Transfer failed");
            (ItemOutcome::Failed(e), None)
        }
    }
}
