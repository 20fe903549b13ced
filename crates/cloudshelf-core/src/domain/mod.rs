//! Domain entities and business logic
//!
//! This module contains the core domain types for CloudShelf:
//! - Newtypes for keys, cursors, hashes and bucket identifiers
//! - Resources and the derived directory tree
//! - Bucket permission, bound domains and lifecycle phase
//! - Sync operations, plans and merge settings
//! - Per-item outcome reports
//! - Domain and provider error types

pub mod bucket_state;
pub mod errors;
pub mod newtypes;
pub mod outcome;
pub mod resource;
pub mod sync_op;
pub mod tree;

// Re-export commonly used types
pub use bucket_state::{BoundDomains, BucketPhase, Permission};
pub use errors::{DomainError, ProviderError};
pub use newtypes::*;
pub use outcome::{BulkEntry, BulkReport, ItemOutcome, SyncEntry, SyncReport};
pub use resource::{Resource, Vendor};
pub use sync_op::{MergePolicy, MergeType, OperationKind, SyncOperation, SyncPlan};
pub use tree::{FolderStats, ResourceTree};
