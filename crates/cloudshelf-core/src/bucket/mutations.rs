//! Bulk removal and renames
//!
//! The listing and the index are only updated for changes the vendor
//! confirmed. A failed item never rolls back the others.

use std::collections::BTreeSet;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Bucket, BucketError};
use crate::domain::errors::{DomainError, ProviderError};
use crate::domain::newtypes::{directory_prefix, ObjectKey};
use crate::domain::outcome::{BulkReport, ItemOutcome};
use crate::domain::resource::Resource;

/// Largest batch accepted by multi-object delete APIs
const DELETE_BATCH: usize = 1000;

type RenameResult = (ObjectKey, ObjectKey, Option<Resource>, Result<Resource, ProviderError>);

impl Bucket {
    /// Delete resources, reporting each key separately
    ///
    /// Directory keys expand to every stored descendant, including zero-size
    /// directory markers and the directory's own marker. Duplicate keys are
    /// removed once. Only deletions the vendor accepted are removed from
    /// the listing, the selection and the index. Never fails as a whole.
    #[tracing::instrument(skip(self, keys, cancel), fields(bucket = %self.context.name, count = keys.len()))]
    pub async fn remove_resources(
        &mut self,
        keys: &[ObjectKey],
        cancel: &CancellationToken,
    ) -> BulkReport {
        let delimiter = self.settings.delimiter.clone();
        let mut report = BulkReport::new();
        let mut targets: BTreeSet<ObjectKey> = BTreeSet::new();
        let mut directories: Vec<ObjectKey> = Vec::new();

        let requested: BTreeSet<&ObjectKey> = keys.iter().collect();
        for key in requested {
            if !key.is_directory_key(&delimiter) {
                targets.insert(key.clone());
                continue;
            }
            match self.collect_stored(key.as_str(), cancel).await {
                Ok(found) => {
                    targets.extend(found.into_iter().map(|r| r.key().clone()));
                    directories.push(key.clone());
                }
                Err(e) => {
                    warn!(prefix = %key, error = %e, "Could not expand directory for removal");
                    report.push(key.as_str(), outcome_of_error(e.into_provider_error()));
                }
            }
        }

        let targets: Vec<ObjectKey> = targets.into_iter().collect();
        let mut accepted: Vec<ObjectKey> = Vec::new();
        let mut rejected: Vec<ObjectKey> = Vec::new();

        for chunk in targets.chunks(DELETE_BATCH) {
            if cancel.is_cancelled() {
                for key in chunk {
                    report.push(key.as_str(), ItemOutcome::Aborted);
                    rejected.push(key.clone());
                }
                continue;
            }

            let adapter = &self.adapter;
            let ctx = &self.context;
            let result = self
                .settings
                .retry
                .run("delete_objects", cancel, || async move {
                    adapter.delete_objects(ctx, chunk).await
                })
                .await;

            match result {
                Ok(per_key) => {
                    for key in chunk {
                        let outcome = match per_key.get(key) {
                            Some(Ok(())) => {
                                accepted.push(key.clone());
                                ItemOutcome::Succeeded
                            }
                            Some(Err(e)) => outcome_of_error(e.clone()),
                            None => ItemOutcome::Failed(ProviderError::InvalidResponse(format!(
                                "no delete result for {key}"
                            ))),
                        };
                        if !outcome.is_success() {
                            rejected.push(key.clone());
                        }
                        report.push(key.as_str(), outcome);
                    }
                }
                Err(e) => {
                    warn!(error = %e, batch = chunk.len(), "Batch delete failed");
                    for key in chunk {
                        report.push(key.as_str(), outcome_of_error(e.clone()));
                        rejected.push(key.clone());
                    }
                }
            }
        }

        for key in &accepted {
            self.remove_listed(key.as_str());
            self.selection.remove(key);
        }
        for dir in directories {
            if !rejected.iter().any(|k| k.is_descendant_of(dir.as_str(), &delimiter)) {
                self.remove_listed(dir.as_str());
                self.selection.remove(&dir);
            }
        }
        self.index_remove(&accepted).await;

        info!(
            removed = accepted.len(),
            failed = report.failed().count(),
            "Remove finished"
        );
        report
    }

    /// Rename the last path segment of a file or directory
    pub async fn rename_resource(
        &mut self,
        key: &ObjectKey,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<BulkReport, BucketError> {
        let target = key.with_name(new_name, &self.settings.delimiter)?;
        self.move_resources(key, &target, cancel).await
    }

    /// Move a file, or a directory with every descendant, to a new key
    ///
    /// `old` names a directory when it ends with the delimiter, or when it is
    /// a bare prefix with objects stored below it (`a/b` for `a/b/1.txt`).
    /// Directory moves collect descendants from the vendor (not from the
    /// loaded listing), markers included, and rename them with bounded
    /// concurrency. Only confirmed renames are applied locally. A rename
    /// that left both keys behind ([`ProviderError::Duplicated`]) adds the
    /// new key and keeps the old one.
    ///
    /// # Errors
    /// Fails as a whole only if the move is invalid or the descendant
    /// listing fails; per-key failures are in the report.
    #[tracing::instrument(skip(self, cancel), fields(bucket = %self.context.name))]
    pub async fn move_resources(
        &mut self,
        old: &ObjectKey,
        new: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<BulkReport, BucketError> {
        let delimiter = self.settings.delimiter.clone();
        if old == new {
            return Ok(BulkReport::new());
        }

        let old_dir = directory_prefix(old.as_str(), &delimiter);
        let stored = if old.is_directory_key(&delimiter) {
            Some(self.collect_stored(&old_dir, cancel).await?)
        } else {
            match self.collect_stored(&old_dir, cancel).await {
                Ok(below) if !below.is_empty() => Some(below),
                Ok(_) => None,
                Err(BucketError::Cancelled) => return Err(BucketError::Cancelled),
                Err(e) => {
                    debug!(key = %old, error = %e, "Could not check for a directory, moving as a file");
                    None
                }
            }
        };

        let Some(stored) = stored else {
            if new.is_directory_key(&delimiter) {
                return Err(DomainError::ValidationFailed(format!(
                    "cannot move file {old} onto directory key {new}"
                ))
                .into());
            }
            let known = self.listing.iter().find(|r| r.key() == old).cloned();
            let pairs = vec![(old.clone(), new.clone(), known)];
            let mut results = self.rename_all(pairs, cancel).await;
            results.sort_by(|a, b| a.0.cmp(&b.0));
            let report = self.apply_renames(None, results).await;
            log_move(old.as_str(), new.as_str(), &report);
            return Ok(report);
        };

        let new_dir = directory_prefix(new.as_str(), &delimiter);
        if new_dir.starts_with(old_dir.as_str()) {
            return Err(DomainError::ValidationFailed(format!(
                "cannot move {old} into itself"
            ))
            .into());
        }

        let pairs: Vec<(ObjectKey, ObjectKey, Option<Resource>)> = stored
            .into_iter()
            .filter_map(|r| {
                let target = if r.key().as_str() == old_dir {
                    ObjectKey::new(new_dir.clone()).ok()?
                } else {
                    r.key().rebase(&old_dir, &new_dir, &delimiter)?
                };
                Some((r.key().clone(), target, Some(r)))
            })
            .collect();

        let mut results = self.rename_all(pairs, cancel).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        let report = self
            .apply_renames(Some((old_dir.as_str(), new_dir.as_str())), results)
            .await;

        if report.entries.iter().any(|e| {
            matches!(
                e.outcome,
                ItemOutcome::Succeeded | ItemOutcome::Failed(ProviderError::Duplicated { .. })
            )
        }) {
            self.moved_prefixes.push((old_dir.clone(), new_dir.clone()));
        }

        log_move(&old_dir, &new_dir, &report);
        Ok(report)
    }

    async fn rename_all(
        &self,
        pairs: Vec<(ObjectKey, ObjectKey, Option<Resource>)>,
        cancel: &CancellationToken,
    ) -> Vec<RenameResult> {
        let adapter = &self.adapter;
        let ctx = &self.context;
        let retry = self.settings.retry;

        stream::iter(pairs)
            .map(|(source, target, known)| async move {
                if cancel.is_cancelled() {
                    return (source, target, known, Err(ProviderError::Aborted));
                }
                let (s, t) = (&source, &target);
                let result = retry
                    .run("rename_object", cancel, || async move {
                        adapter.rename_object(ctx, s, t).await
                    })
                    .await;
                (source, target, known, result)
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await
    }

    /// Apply confirmed renames; `directory` is the moved `(old, new)` prefix pair
    async fn apply_renames(
        &mut self,
        directory: Option<(&str, &str)>,
        results: Vec<RenameResult>,
    ) -> BulkReport {
        let mut report = BulkReport::new();
        let mut confirmed: Vec<(ObjectKey, ObjectKey)> = Vec::new();
        let mut duplicated: Vec<Resource> = Vec::new();
        let mut all_moved = true;

        for (source, target, known, result) in results {
            match result {
                Ok(resource) => {
                    self.remove_listed(source.as_str());
                    if let Some(entry) = self.view_entry_for(&resource) {
                        self.insert_listed(entry);
                    }
                    if self.selection.remove(&source) {
                        self.selection.insert(target.clone());
                    }
                    confirmed.push((source.clone(), target));
                    report.push(source.as_str(), ItemOutcome::Succeeded);
                }
                Err(e) => {
                    all_moved = false;
                    if matches!(e, ProviderError::Duplicated { .. }) {
                        if let Some(copy) = known.map(|r| r.with_key(target)) {
                            if let Some(entry) = self.view_entry_for(&copy) {
                                self.insert_listed(entry);
                            }
                            duplicated.push(copy);
                        }
                    }
                    warn!(source = %source, error = %e, "Rename failed");
                    report.push(source.as_str(), outcome_of_error(e));
                }
            }
        }

        if let (true, Some((old_dir, new_dir))) = (all_moved, directory) {
            self.remove_listed(old_dir);
            if let Ok(old_key) = ObjectKey::new(old_dir.to_string()) {
                if self.selection.remove(&old_key) {
                    if let Ok(key) = ObjectKey::new(new_dir.to_string()) {
                        self.selection.insert(key);
                    }
                }
            }
        }

        self.index_rename(&confirmed).await;
        if !duplicated.is_empty() {
            self.index_upsert(&duplicated).await;
        }
        report
    }
}

fn log_move(from: &str, to: &str, report: &BulkReport) {
    info!(
        from = %from,
        to = %to,
        moved = report.succeeded().count(),
        failed = report.failed().count(),
        "Move finished"
    );
}

fn outcome_of_error(err: ProviderError) -> ItemOutcome {
    ItemOutcome::from_result::<()>(&Err(err))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::super::test_support::*;
    use super::*;
    use crate::bucket::ListOptions;
    use crate::memory::MemoryProvider;

    async fn bound(keys: &[&str]) -> (Arc<MemoryProvider>, Bucket) {
        let provider = provider_with(keys);
        let mut bucket = bucket(&provider);
        bucket.bind(&CancellationToken::new()).await.unwrap();
        (provider, bucket)
    }

    #[tokio::test]
    async fn test_partial_bulk_delete_reports_each_key() {
        let (provider, mut bucket) = bound(&["a.txt", "b.txt", "c.txt"]).await;
        bucket
            .list_all(ListOptions::root(), &CancellationToken::new())
            .await
            .unwrap();
        provider.deny_delete("b.txt");

        let keys = [key("a.txt"), key("b.txt"), key("c.txt")];
        let report = bucket.remove_resources(&keys, &CancellationToken::new()).await;

        assert_eq!(report.len(), 3);
        assert!(report.is_partial_failure());
        assert_eq!(report.succeeded().collect::<Vec<_>>(), vec!["a.txt", "c.txt"]);
        assert!(matches!(
            report.outcome_of("b.txt"),
            Some(ItemOutcome::Failed(ProviderError::Permission(_)))
        ));

        let listed: Vec<&str> = bucket.resources().iter().map(|r| r.key().as_str()).collect();
        assert_eq!(listed, vec!["b.txt"]);
        assert_eq!(provider.keys(BUCKET), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn test_remove_deduplicates_keys() {
        let (_provider, mut bucket) = bound(&["a.txt"]).await;
        let keys = [key("a.txt"), key("a.txt")];
        let report = bucket.remove_resources(&keys, &CancellationToken::new()).await;
        assert_eq!(report.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_directory_expands_descendants() {
        let (provider, mut bucket) = bound(&["d/1", "d/e/2", "dx"]).await;
        let report = bucket
            .remove_resources(&[key("d/")], &CancellationToken::new())
            .await;

        assert_eq!(report.succeeded().count(), 2);
        assert_eq!(provider.keys(BUCKET), vec!["dx"]);
        assert!(!bucket.resources().iter().any(|r| r.key().as_str() == "d/"));
    }

    #[tokio::test]
    async fn test_remove_directory_deletes_its_markers() {
        let (provider, mut bucket) = bound(&["d/1"]).await;
        provider.insert(BUCKET, "d/", Vec::new(), Utc::now());
        provider.insert(BUCKET, "d/e/", Vec::new(), Utc::now());

        let report = bucket
            .remove_resources(&[key("d/")], &CancellationToken::new())
            .await;

        assert!(!report.is_partial_failure());
        assert_eq!(report.succeeded().count(), 3);
        assert!(provider.keys(BUCKET).is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_remove_aborts_everything() {
        let (provider, mut bucket) = bound(&["a", "b"]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = bucket.remove_resources(&[key("a"), key("b")], &cancel).await;
        assert!(report.entries.iter().all(|e| e.outcome == ItemOutcome::Aborted));
        assert_eq!(provider.keys(BUCKET).len(), 2);
    }

    #[tokio::test]
    async fn test_directory_rename_moves_every_descendant() {
        let (provider, mut bucket) =
            bound(&["a/b/1.txt", "a/b/deep/2.txt", "a/bx", "a/keep.txt"]).await;
        bucket
            .list_all(ListOptions::prefix("a/"), &CancellationToken::new())
            .await
            .unwrap();

        let report = bucket
            .rename_resource(&key("a/b/"), "c", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.succeeded().count(), 2);
        let keys = provider.keys(BUCKET);
        assert!(keys.iter().all(|k| !k.starts_with("a/b/")));
        assert!(keys.contains(&"a/c/1.txt".to_string()));
        assert!(keys.contains(&"a/c/deep/2.txt".to_string()));
        assert!(keys.contains(&"a/bx".to_string()));

        let listed: Vec<&str> = bucket.resources().iter().map(|r| r.key().as_str()).collect();
        assert!(listed.contains(&"a/c/"));
        assert!(!listed.contains(&"a/b/"));
        assert!(listed.contains(&"a/bx"));
        assert_eq!(bucket.moved_prefixes(), &[("a/b/".to_string(), "a/c/".to_string())]);
    }

    #[tokio::test]
    async fn test_directory_rename_moves_markers() {
        let (provider, mut bucket) = bound(&["a/b/1.txt", "a/b/2.txt", "a/b/x/3.txt"]).await;
        provider.insert(BUCKET, "a/b/", Vec::new(), Utc::now());
        provider.insert(BUCKET, "a/b/x/", Vec::new(), Utc::now());
        bucket
            .list_all(ListOptions::prefix("a/"), &CancellationToken::new())
            .await
            .unwrap();

        let report = bucket
            .move_resources(&key("a/b/"), &key("a/c/"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_partial_failure());
        assert_eq!(
            provider.keys(BUCKET),
            vec!["a/c/", "a/c/1.txt", "a/c/2.txt", "a/c/x/", "a/c/x/3.txt"]
        );
        let listed: Vec<&Resource> = bucket.resources().iter().collect();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key().as_str(), "a/c/");
        assert!(listed[0].is_directory());
    }

    #[tokio::test]
    async fn test_bare_prefix_moves_as_directory() {
        let (provider, mut bucket) =
            bound(&["a/b/1.txt", "a/b/2.txt", "a/b/x/3.txt", "a/bx"]).await;

        let report = bucket
            .move_resources(&key("a/b"), &key("a/c"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.succeeded().count(), 3);
        assert_eq!(
            provider.keys(BUCKET),
            vec!["a/bx", "a/c/1.txt", "a/c/2.txt", "a/c/x/3.txt"]
        );
        assert_eq!(bucket.moved_prefixes(), &[("a/b/".to_string(), "a/c/".to_string())]);
    }

    #[tokio::test]
    async fn test_duplicated_rename_keeps_both_keys() {
        let (provider, mut bucket) = bound(&["a/1", "a/2"]).await;
        bucket
            .list_all(ListOptions::recursive(""), &CancellationToken::new())
            .await
            .unwrap();
        provider.deny_delete("a/2");

        let report = bucket
            .move_resources(&key("a/"), &key("z/"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            report.outcome_of("a/2"),
            Some(ItemOutcome::Failed(ProviderError::Duplicated { .. }))
        ));
        let listed: Vec<&str> = bucket.resources().iter().map(|r| r.key().as_str()).collect();
        assert!(listed.contains(&"a/2"));
        assert!(listed.contains(&"z/2"));
        assert!(listed.contains(&"z/1"));
        assert!(!listed.contains(&"a/1"));
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_listing_untouched() {
        let (provider, mut bucket) = bound(&["f.txt"]).await;
        provider.deny_copy("f.txt");
        let report = bucket
            .rename_resource(&key("f.txt"), "g.txt", &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_partial_failure());
        let listed: Vec<&str> = bucket.resources().iter().map(|r| r.key().as_str()).collect();
        assert_eq!(listed, vec!["f.txt"]);
        assert_eq!(provider.keys(BUCKET), vec!["f.txt"]);
    }

    #[tokio::test]
    async fn test_file_rename_updates_selection() {
        let (_provider, mut bucket) = bound(&["old.txt"]).await;
        bucket.select(key("old.txt"));
        bucket
            .rename_resource(&key("old.txt"), "new.txt", &CancellationToken::new())
            .await
            .unwrap();

        assert!(bucket.is_selected(&key("new.txt")));
        assert!(!bucket.is_selected(&key("old.txt")));
    }

    #[tokio::test]
    async fn test_move_into_itself_is_rejected() {
        let (_provider, mut bucket) = bound(&["a/1"]).await;
        let err = bucket
            .move_resources(&key("a/"), &key("a/sub/"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BucketError::Domain(_)));
    }

    #[tokio::test]
    async fn test_directory_move_with_many_descendants() {
        let keys: Vec<String> = (0..12).map(|i| format!("src/{i:02}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let (provider, mut bucket) = bound(&refs).await;
        bucket.settings.concurrency = 3;

        let report = bucket
            .move_resources(&key("src/"), &key("dst/"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.succeeded().count(), 12);
        assert!(provider.keys(BUCKET).iter().all(|k| k.starts_with("dst/")));
    }
}
