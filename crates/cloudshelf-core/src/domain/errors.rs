//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including key validation failures and invalid phase transitions, and the
//! vendor-neutral failure taxonomy every provider adapter maps into.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid object key format or content
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Invalid content hash format (expected hex digest)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid pagination cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Unknown merge policy, merge type or permission name
    #[error("Unknown value '{value}' for {kind}")]
    UnknownVariant {
        /// The enum being parsed
        kind: &'static str,
        /// The rejected input
        value: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

/// Vendor-neutral classification of a failed provider call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network failure or throttling; the call may be retried
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The credentials do not allow this call
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Storage quota or request quota exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The call was cancelled before completion
    #[error("Operation aborted")]
    Aborted,

    /// The object or bucket does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The vendor does not offer this capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A rename copied the object but could not delete the source
    ///
    /// Both keys now exist remotely.
    #[error("Rename of {source_key} to {target_key} left a duplicate: {reason}")]
    Duplicated {
        source_key: String,
        target_key: String,
        reason: String,
    },

    /// The vendor answered with something the adapter could not interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local content could not be read for an upload
    #[error("Local I/O error: {0}")]
    LocalIo(String),
}

impl ProviderError {
    /// Returns true if retrying the same call may succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Short stable name for logs and reports
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) => "transient_network",
            Self::Permission(_) => "permission",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::Aborted => "aborted",
            Self::NotFound(_) => "not_found",
            Self::Unsupported(_) => "unsupported",
            Self::Duplicated { .. } => "duplicated",
            Self::InvalidResponse(_) => "invalid_response",
            Self::LocalIo(_) => "local_io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidKey("/leading".to_string());
        assert_eq!(err.to_string(), "Invalid object key: /leading");

        let err = DomainError::InvalidState {
            from: "Unbound".to_string(),
            to: "Listing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Unbound to Listing"
        );

        let err = DomainError::UnknownVariant {
            kind: "merge policy",
            value: "sometimes".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown value 'sometimes' for merge policy");
    }

    #[test]
    fn test_only_transient_errors_retry() {
        assert!(ProviderError::TransientNetwork("reset".to_string()).is_retryable());
        assert!(!ProviderError::Permission("denied".to_string()).is_retryable());
        assert!(!ProviderError::QuotaExceeded("full".to_string()).is_retryable());
        assert!(!ProviderError::Aborted.is_retryable());
    }

    #[test]
    fn test_duplicated_display() {
        let err = ProviderError::Duplicated {
            source_key: "a/x".to_string(),
            target_key: "b/x".to_string(),
            reason: "delete denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Rename of a/x to b/x left a duplicate: delete denied"
        );
        assert_eq!(err.kind(), "duplicated");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidKey("a//b".to_string());
        let err2 = DomainError::InvalidKey("a//b".to_string());
        let err3 = DomainError::InvalidKey("a/c".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
