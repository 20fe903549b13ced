//! Sync operations, plans and merge settings
//!
//! The diff engine produces a [`SyncPlan`]; the executor consumes it. A plan
//! is keyed by target path, so it can never hold two operations for the
//! same path.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// MergePolicy / MergeType
// ============================================================================

/// How conflicting remote content is treated when both sides hold a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Local content always replaces remote content
    #[default]
    Overwrite,
    /// Existing remote content is never touched
    Preserve,
    /// Upload only when the local copy is strictly newer
    Newest,
}

impl MergePolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Overwrite => "overwrite",
            Self::Preserve => "preserve",
            Self::Newest => "newest",
        }
    }
}

impl Display for MergePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "preserve" => Ok(Self::Preserve),
            "newest" => Ok(Self::Newest),
            other => Err(DomainError::UnknownVariant {
                kind: "merge policy",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether remote-only entries are deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeType {
    /// Remote becomes an exact copy of local
    Mirror,
    /// Local entries are added or updated, nothing is deleted
    #[default]
    Merge,
}

impl MergeType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mirror => "mirror",
            Self::Merge => "merge",
        }
    }
}

impl Display for MergeType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mirror" => Ok(Self::Mirror),
            "merge" => Ok(Self::Merge),
            other => Err(DomainError::UnknownVariant {
                kind: "merge type",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// SyncOperation
// ============================================================================

/// What must happen to one target path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Update,
    Delete,
    Skip,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Skip => "skip",
        }
    }

    /// Returns true for operations that upload local content
    #[must_use]
    pub const fn is_transfer(&self) -> bool {
        matches!(self, Self::Add | Self::Update)
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single planned change, addressed by delimiter-separated relative path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncOperation {
    pub path: String,
    pub kind: OperationKind,
}

impl SyncOperation {
    #[must_use]
    pub fn new(path: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl Display for SyncOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

// ============================================================================
// SyncPlan
// ============================================================================

/// Ordered set of operations, unique by target path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    operations: BTreeMap<String, SyncOperation>,
}

impl SyncPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an operation, replacing any earlier one for the same path
    pub fn insert(&mut self, operation: SyncOperation) {
        self.operations.insert(operation.path.clone(), operation);
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&SyncOperation> {
        self.operations.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyncOperation> {
        self.operations.values()
    }

    /// Operations of one kind, in path order
    pub fn of_kind(&self, kind: OperationKind) -> impl Iterator<Item = &SyncOperation> {
        self.operations.values().filter(move |op| op.kind == kind)
    }

    /// Number of operations of one kind
    #[must_use]
    pub fn count(&self, kind: OperationKind) -> usize {
        self.of_kind(kind).count()
    }

    /// Returns true if executing the plan would change nothing
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.operations
            .values()
            .all(|op| op.kind == OperationKind::Skip)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_operations(self) -> Vec<SyncOperation> {
        self.operations.into_values().collect()
    }
}

impl FromIterator<SyncOperation> for SyncPlan {
    fn from_iter<T: IntoIterator<Item = SyncOperation>>(iter: T) -> Self {
        let mut plan = Self::new();
        for op in iter {
            plan.insert(op);
        }
        plan
    }
}
