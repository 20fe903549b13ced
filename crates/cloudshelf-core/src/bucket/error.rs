//! Error types for bucket operations

use thiserror::Error;

use crate::domain::errors::{DomainError, ProviderError};

/// Errors returned by [`Bucket`](super::Bucket) operations
///
/// Per-item failures of bulk operations are not errors: they are reported
/// in a [`BulkReport`](crate::domain::BulkReport).
#[derive(Debug, Error)]
pub enum BucketError {
    /// The vendor call failed after retries
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The caller cancelled the operation; no partial state was merged
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid key, name or phase transition
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Reading local content for an upload failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BucketError {
    /// Collapse into the provider taxonomy for reports
    #[must_use]
    pub fn into_provider_error(self) -> ProviderError {
        match self {
            Self::Provider(e) => e,
            Self::Cancelled => ProviderError::Aborted,
            Self::Domain(e) => ProviderError::InvalidResponse(e.to_string()),
            Self::Io(e) => ProviderError::LocalIo(e.to_string()),
        }
    }
}
