//! Folder diff engine
//!
//! Compares a [`LocalSnapshot`] with a [`RemoteSnapshot`] and produces a
//! [`SyncPlan`] with exactly one operation per path seen on either side.
//!
//! ## Rules
//!
//! | Local | Remote | Plan |
//! |-------|--------|------|
//! | present | absent | `Add` |
//! | present | present, same content | `Skip` |
//! | present | present, different content | `Update` |
//! | absent | present | `Delete` (mirror only) |
//!
//! Content is compared by MD5 when both sides know it. Otherwise a
//! differing size or a differing modification time (whole seconds) counts
//! as a change.

use cloudshelf_core::domain::{MergeType, OperationKind, SyncOperation, SyncPlan};
use tracing::debug;

use crate::snapshot::{EntryState, LocalSnapshot, RemoteSnapshot};

/// Builds sync plans for one merge type
#[derive(Debug, Clone, Copy)]
pub struct DiffEngine {
    merge_type: MergeType,
}

impl DiffEngine {
    #[must_use]
    pub fn new(merge_type: MergeType) -> Self {
        Self { merge_type }
    }

    #[must_use]
    pub fn merge_type(&self) -> MergeType {
        self.merge_type
    }

    /// Compute the plan that makes `remote` reflect `local`
    ///
    /// Pure and deterministic: equal inputs give equal plans.
    #[must_use]
    pub fn diff(&self, local: &LocalSnapshot, remote: &RemoteSnapshot) -> SyncPlan {
        let mut plan = SyncPlan::new();

        for (path, local_state) in local.iter() {
            let kind = match remote.get(path) {
                None => OperationKind::Add,
                Some(remote_state) if content_differs(local_state, remote_state) => {
                    OperationKind::Update
                }
                Some(_) => OperationKind::Skip,
            };
            plan.insert(SyncOperation::new(path, kind));
        }

        if self.merge_type == MergeType::Mirror {
            for (path, _) in remote.iter().filter(|(p, _)| local.get(p).is_none()) {
                plan.insert(SyncOperation::new(path, OperationKind::Delete));
            }
        }

        debug!(
            merge_type = %self.merge_type,
            add = plan.count(OperationKind::Add),
            update = plan.count(OperationKind::Update),
            delete = plan.count(OperationKind::Delete),
            skip = plan.count(OperationKind::Skip),
            "Diff computed"
        );
        plan
    }
}

/// Returns true if the two states describe different content
#[must_use]
pub fn content_differs(local: &EntryState, remote: &EntryState) -> bool {
    if let (Some(a), Some(b)) = (&local.hash, &remote.hash) {
        return !a.eq_ignore_ascii_case(b);
    }
    if local.size != remote.size {
        return true;
    }
    match (local.modified, remote.modified) {
        (Some(a), Some(b)) => a.timestamp() != b.timestamp(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn at(secs: i64) -> Option<chrono::DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs))
    }

    fn local(entries: &[(&str, EntryState)]) -> LocalSnapshot {
        LocalSnapshot::from_entries(
            "/tmp/src",
            entries.iter().map(|(p, s)| ((*p).to_string(), s.clone())),
        )
    }

    fn remote(keys: &[&str]) -> RemoteSnapshot {
        use cloudshelf_core::domain::{ObjectKey, Resource, Vendor};
        let resources: Vec<Resource> = keys
            .iter()
            .map(|k| {
                Resource::object(ObjectKey::new(format!("dst/{k}")).unwrap(), 1, Vendor::Memory)
                    .with_modified(at(0).unwrap())
            })
            .collect();
        RemoteSnapshot::from_resources("dst", "/", &resources)
    }

    fn state(size: u64) -> EntryState {
        EntryState::new(size, at(0))
    }

    fn kinds(plan: &SyncPlan) -> Vec<(String, OperationKind)> {
        plan.iter().map(|op| (op.path.clone(), op.kind)).collect()
    }

    #[test]
    fn test_mirror_deletes_remote_only() {
        let local = local(&[("f1", state(1)), ("f2", state(1))]);
        let remote = remote(&["f1", "f3"]);

        let plan = DiffEngine::new(MergeType::Mirror).diff(&local, &remote);
        assert_eq!(
            kinds(&plan),
            vec![
                ("f1".to_string(), OperationKind::Skip),
                ("f2".to_string(), OperationKind::Add),
                ("f3".to_string(), OperationKind::Delete),
            ]
        );
    }

    #[test]
    fn test_merge_never_deletes() {
        let local = local(&[("f1", state(1)), ("f2", state(1))]);
        let remote = remote(&["f1", "f3"]);

        let plan = DiffEngine::new(MergeType::Merge).diff(&local, &remote);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get("f2").unwrap().kind, OperationKind::Add);
        assert!(plan.get("f3").is_none());
        assert_eq!(plan.count(OperationKind::Delete), 0);
    }

    #[test]
    fn test_diff_is_deterministic() {
        let local = local(&[("a/b.txt", state(1)), ("c.txt", state(1))]);
        let remote = remote(&["a/b.txt", "c.txt"]);
        let engine = DiffEngine::new(MergeType::Mirror);

        let first = engine.diff(&local, &remote);
        let second = engine.diff(&local, &remote);
        assert_eq!(first, second);
        assert!(first.is_noop());
    }

    #[test]
    fn test_hash_takes_precedence_over_metadata() {
        let same_hash_other_mtime = EntryState::new(3, at(100)).with_hash("ABC123");
        let remote_state = EntryState::new(3, at(0)).with_hash("abc123");
        assert!(!content_differs(&same_hash_other_mtime, &remote_state));

        let other_hash = EntryState::new(3, at(0)).with_hash("def456");
        assert!(content_differs(&other_hash, &remote_state));
    }

    #[test]
    fn test_metadata_fallback_without_hash() {
        let remote_state = EntryState::new(3, at(0)).with_hash("abc123");

        assert!(content_differs(&EntryState::new(4, at(0)), &remote_state));
        assert!(content_differs(&EntryState::new(3, at(2)), &remote_state));
        assert!(!content_differs(&EntryState::new(3, at(0)), &remote_state));
    }

    #[test]
    fn test_subsecond_mtime_difference_ignored() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = EntryState::new(1, Some(base + Duration::milliseconds(100)));
        let b = EntryState::new(1, Some(base + Duration::milliseconds(900)));
        assert!(!content_differs(&a, &b));
    }

    #[test]
    fn test_unknown_mtime_compares_size_only() {
        let a = EntryState::new(1, None);
        let b = EntryState::new(1, at(5));
        assert!(!content_differs(&a, &b));
    }

    #[test]
    fn test_empty_sides() {
        let engine = DiffEngine::new(MergeType::Mirror);
        assert!(engine.diff(&local(&[]), &remote(&[])).is_empty());

        let plan = engine.diff(&local(&[]), &remote(&["x"]));
        assert_eq!(plan.get("x").unwrap().kind, OperationKind::Delete);
    }
}
