//! Integration test: local folder → FolderSync → in-memory bucket
//!
//! Drives complete sync sessions against the memory adapter, checking the
//! merge types, idempotence of repeated runs, failure isolation and
//! cancellation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cloudshelf_core::bucket::{Bucket, BucketSettings};
use cloudshelf_core::domain::{ItemOutcome, MergePolicy, MergeType, ProviderError};
use cloudshelf_core::memory::MemoryProvider;
use cloudshelf_core::ports::BucketContext;
use cloudshelf_core::retry::RetryPolicy;
use cloudshelf_sync::{sync_folder, FolderSync, PolicyEngine, SyncError, SyncEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const BUCKET: &str = "backup-1250000000";

fn make_bucket(provider: &Arc<MemoryProvider>) -> Bucket {
    Bucket::new(
        BucketContext::new(BUCKET, "ap-shanghai"),
        provider.clone(),
        BucketSettings {
            page_limit: 3,
            retry: RetryPolicy::new(2, Duration::from_millis(1)),
            ..BucketSettings::default()
        },
    )
}

async fn write(root: &Path, relative: &str, data: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, data).await.unwrap();
}

/// Local `{f1, f2}` against remote `{f1, f3}`
async fn f1_f2_vs_f1_f3() -> (tempfile::TempDir, Arc<MemoryProvider>) {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "f1", "one").await;
    write(dir.path(), "f2", "two").await;

    let provider = MemoryProvider::shared();
    provider.insert(BUCKET, "site/f1", "one", Utc::now());
    provider.insert(BUCKET, "site/f3", "three", Utc::now());
    (dir, provider)
}

#[tokio::test]
async fn test_mirror_makes_remote_an_exact_copy() {
    let (dir, provider) = f1_f2_vs_f1_f3().await;
    let mut bucket = make_bucket(&provider);

    let report = sync_folder(
        dir.path(),
        &mut bucket,
        "site",
        MergeType::Mirror,
        MergePolicy::Overwrite,
        None,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.outcome_of("f1"), Some(&ItemOutcome::Skipped));
    assert_eq!(report.outcome_of("f2"), Some(&ItemOutcome::Succeeded));
    assert_eq!(report.outcome_of("f3"), Some(&ItemOutcome::Succeeded));
    assert_eq!(provider.keys(BUCKET), vec!["site/f1", "site/f2"]);
}

#[tokio::test]
async fn test_merge_keeps_remote_only_objects() {
    let (dir, provider) = f1_f2_vs_f1_f3().await;
    let mut bucket = make_bucket(&provider);

    let report = sync_folder(
        dir.path(),
        &mut bucket,
        "site/",
        MergeType::Merge,
        MergePolicy::Overwrite,
        None,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.total(), 2);
    assert!(report.outcome_of("f3").is_none());
    assert_eq!(
        provider.keys(BUCKET),
        vec!["site/f1", "site/f2", "site/f3"]
    );
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "docs/a.md", "# a").await;
    write(dir.path(), "docs/nested/b.md", "# b").await;
    write(dir.path(), "c.txt", "c").await;

    let provider = MemoryProvider::shared();
    let mut bucket = make_bucket(&provider);
    let sync = FolderSync::new(MergeType::Mirror, PolicyEngine::default());
    let cancel = CancellationToken::new();

    let first = sync
        .run(dir.path(), &mut bucket, "", None, &cancel)
        .await
        .unwrap();
    assert_eq!(first.completed(), 3);
    assert_eq!(provider.put_calls(), 3);

    let prepared = sync
        .prepare(dir.path(), &bucket, "", &cancel)
        .await
        .unwrap();
    assert!(prepared.plan.is_noop());

    let second = sync
        .run(dir.path(), &mut bucket, "", None, &cancel)
        .await
        .unwrap();
    assert_eq!(second.total(), 3);
    assert!(second
        .entries
        .iter()
        .all(|e| e.outcome == ItemOutcome::Skipped));
    assert_eq!(provider.put_calls(), 3);
}

#[tokio::test]
async fn test_concurrency_limit_from_settings() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        write(dir.path(), &format!("img/{i:02}.jpg"), "jpeg").await;
    }
    let provider = MemoryProvider::shared();
    provider.set_put_delay(Duration::from_millis(15));
    let mut bucket = make_bucket(&provider);

    let report = FolderSync::new(MergeType::Merge, PolicyEngine::default())
        .with_concurrency(3)
        .run(dir.path(), &mut bucket, "", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.completed(), 10);
    assert!(provider.max_concurrent_puts() <= 3);
    assert!(provider.max_concurrent_puts() >= 2);
}

#[tokio::test]
async fn test_partial_failure_is_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "ok-1.txt", "1").await;
    write(dir.path(), "denied.txt", "2").await;
    write(dir.path(), "ok-2.txt", "3").await;

    let provider = MemoryProvider::shared();
    provider.fail_put("denied.txt", ProviderError::QuotaExceeded("full".into()));
    let mut bucket = make_bucket(&provider);

    let report = sync_folder(
        dir.path(),
        &mut bucket,
        "",
        MergeType::Merge,
        MergePolicy::Overwrite,
        None,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.is_partial_failure());
    assert_eq!(report.failed(), 1);
    assert_eq!(report.completed(), 2);
    assert_eq!(provider.keys(BUCKET), vec!["ok-1.txt", "ok-2.txt"]);
}

#[tokio::test]
async fn test_cancellation_aborts_operations_not_started() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..4 {
        write(dir.path(), &format!("{i}.bin"), "payload").await;
    }
    let provider = MemoryProvider::shared();
    provider.set_put_delay(Duration::from_millis(50));
    let mut bucket = make_bucket(&provider);

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if matches!(event, SyncEvent::OperationFinished { .. }) {
                    cancel.cancel();
                }
            }
        })
    };

    let report = FolderSync::new(MergeType::Merge, PolicyEngine::default())
        .with_concurrency(1)
        .run(dir.path(), &mut bucket, "", Some(tx), &cancel)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(report.total(), 4);
    assert!(report.completed() >= 1);
    assert!(report.aborted() >= 1);
    assert_eq!(report.completed() + report.aborted(), 4);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
async fn test_missing_local_root_fails_whole_call() {
    let dir = tempfile::tempdir().unwrap();
    let provider = MemoryProvider::shared();
    let mut bucket = make_bucket(&provider);

    let err = sync_folder(
        &dir.path().join("missing"),
        &mut bucket,
        "",
        MergeType::Mirror,
        MergePolicy::Overwrite,
        None,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SyncError::Snapshot { .. }));
    assert_eq!(provider.put_calls(), 0);
}

#[tokio::test]
async fn test_remote_listing_failure_fails_whole_call() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.txt", "a").await;
    let provider = MemoryProvider::shared();
    provider.fail_lists(ProviderError::Permission("list denied".into()));
    let mut bucket = make_bucket(&provider);

    let err = sync_folder(
        dir.path(),
        &mut bucket,
        "dst",
        MergeType::Merge,
        MergePolicy::Overwrite,
        None,
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, SyncError::Listing { ref prefix, .. } if prefix == "dst"));
    assert_eq!(provider.put_calls(), 0);
}

#[tokio::test]
async fn test_newest_policy_skips_older_local_copy() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "report.csv", "local edit").await;

    let provider = MemoryProvider::shared();
    let remote_time = Utc::now() + chrono::Duration::hours(1);
    provider.insert(BUCKET, "report.csv", "remote edit", remote_time);
    let mut bucket = make_bucket(&provider);

    let report = sync_folder(
        dir.path(),
        &mut bucket,
        "",
        MergeType::Merge,
        MergePolicy::Newest,
        None,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcome_of("report.csv"), Some(&ItemOutcome::Skipped));
    assert_eq!(
        provider.content(BUCKET, "report.csv").unwrap(),
        b"remote edit"
    );
}
