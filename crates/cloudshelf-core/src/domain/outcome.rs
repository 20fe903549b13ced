//! Per-item outcome reports for bulk mutations and sync runs
//!
//! Bulk operations never collapse individual failures into one opaque
//! error. Every input item gets exactly one entry.

use serde::Serialize;

use super::errors::ProviderError;
use super::sync_op::SyncOperation;

/// Result of one item within a bulk operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Failed(ProviderError),
    /// Nothing needed doing (or the merge policy declined the change)
    Skipped,
    /// Cancelled before the call was issued
    Aborted,
}

impl ItemOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        }
    }

    /// Map a provider result into an outcome
    ///
    /// `ProviderError::Aborted` becomes [`ItemOutcome::Aborted`], not a failure.
    #[must_use]
    pub fn from_result<T>(result: &Result<T, ProviderError>) -> Self {
        match result {
            Ok(_) => Self::Succeeded,
            Err(ProviderError::Aborted) => Self::Aborted,
            Err(e) => Self::Failed(e.clone()),
        }
    }
}

impl Serialize for ItemOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Failed(e) => serializer.serialize_str(&format!("failed: {e}")),
            other => serializer.serialize_str(other.label()),
        }
    }
}

// ============================================================================
// BulkReport
// ============================================================================

/// Entry of a [`BulkReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkEntry {
    pub key: String,
    pub outcome: ItemOutcome,
}

/// Outcome of a multi-key remove or move
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub entries: Vec<BulkEntry>,
}

impl BulkReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, outcome: ItemOutcome) {
        self.entries.push(BulkEntry {
            key: key.into(),
            outcome,
        });
    }

    /// Keys whose operation succeeded
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|e| e.outcome == ItemOutcome::Succeeded)
            .map(|e| e.key.as_str())
    }

    /// Failed entries with their errors
    pub fn failed(&self) -> impl Iterator<Item = (&str, &ProviderError)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            ItemOutcome::Failed(err) => Some((e.key.as_str(), err)),
            _ => None,
        })
    }

    #[must_use]
    pub fn outcome_of(&self, key: &str) -> Option<&ItemOutcome> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.outcome)
    }

    /// Returns true if at least one item failed
    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_failure())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SyncReport
// ============================================================================

/// Entry of a [`SyncReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEntry {
    pub operation: SyncOperation,
    pub outcome: ItemOutcome,
}

/// Outcome of executing a sync plan
///
/// Holds exactly one entry per planned operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub entries: Vec<SyncEntry>,
    pub duration_ms: u64,
}

impl SyncReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: SyncOperation, outcome: ItemOutcome) {
        self.entries.push(SyncEntry { operation, outcome });
    }

    /// Number of operations that ran to completion (succeeded or skipped)
    #[must_use]
    pub fn completed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }

    #[must_use]
    pub fn aborted(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome == ItemOutcome::Aborted)
            .count()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn outcome_of(&self, path: &str) -> Option<&ItemOutcome> {
        self.entries
            .iter()
            .find(|e| e.operation.path == path)
            .map(|e| &e.outcome)
    }

    #[must_use]
    pub fn is_partial_failure(&self) -> bool {
        self.failed() > 0
    }

    /// Sort entries by path for stable output
    pub fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| a.operation.path.cmp(&b.operation.path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sync_op::OperationKind;

    #[test]
    fn test_bulk_report_partial_failure() {
        let mut report = BulkReport::new();
        report.push("a", ItemOutcome::Succeeded);
        report.push("b", ItemOutcome::Failed(ProviderError::Permission("no".into())));
        report.push("c", ItemOutcome::Succeeded);

        assert!(report.is_partial_failure());
        assert_eq!(report.succeeded().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.outcome_of("c"), Some(&ItemOutcome::Succeeded));
    }

    #[test]
    fn test_outcome_from_result() {
        let ok: Result<(), ProviderError> = Ok(());
        assert_eq!(ItemOutcome::from_result(&ok), ItemOutcome::Succeeded);

        let aborted: Result<(), ProviderError> = Err(ProviderError::Aborted);
        assert_eq!(ItemOutcome::from_result(&aborted), ItemOutcome::Aborted);
        assert!(!ItemOutcome::Aborted.is_failure());
    }

    #[test]
    fn test_sync_report_counts() {
        let mut report = SyncReport::new();
        report.push(SyncOperation::new("x", OperationKind::Add), ItemOutcome::Succeeded);
        report.push(SyncOperation::new("y", OperationKind::Skip), ItemOutcome::Skipped);
        report.push(SyncOperation::new("z", OperationKind::Add), ItemOutcome::Aborted);

        assert_eq!(report.total(), 3);
        assert_eq!(report.completed(), 2);
        assert_eq!(report.aborted(), 1);
        assert!(!report.is_partial_failure());
    }

    #[test]
    fn test_outcome_serializes_as_label() {
        let json = serde_yaml::to_string(&ItemOutcome::Skipped).unwrap();
        assert_eq!(json.trim(), "skipped");
    }
}
