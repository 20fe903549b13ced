//! Bucket access state: permission, bound domains and lifecycle phase

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Permission
// ============================================================================

/// Read permission of a bucket as reported by its ACL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Anonymous reads are denied; URLs must be signed
    Private,
    /// Anonymous reads are allowed
    Public,
    /// ACL could not be read; treated as public
    #[default]
    Unknown,
}

impl Permission {
    /// Returns true if generated URLs must carry a signature
    #[must_use]
    pub const fn requires_signing(&self) -> bool {
        matches!(self, Self::Private)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "public" | "public-read" | "public-read-write" => Ok(Self::Public),
            "unknown" => Ok(Self::Unknown),
            other => Err(DomainError::UnknownVariant {
                kind: "permission",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// BoundDomains
// ============================================================================

/// Custom domains bound to a bucket, most recently used first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundDomains(Vec<String>);

impl BoundDomains {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `domain` to the head, inserting it if unknown
    pub fn touch(&mut self, domain: &str) {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return;
        }
        self.0.retain(|d| *d != domain);
        self.0.insert(0, domain);
    }

    /// Replace the domain set with a fresh vendor answer
    ///
    /// Domains already known keep their relative MRU order ahead of new
    /// ones; domains missing from `domains` are dropped.
    pub fn replace<I, S>(&mut self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fresh: Vec<String> = domains
            .into_iter()
            .map(|d| normalize_domain(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();

        let mut next: Vec<String> = self
            .0
            .iter()
            .filter(|d| fresh.contains(d))
            .cloned()
            .collect();
        for domain in fresh {
            if !next.contains(&domain) {
                next.push(domain);
            }
        }
        self.0 = next;
    }

    /// Most recently used domain
    #[must_use]
    pub fn primary(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        self.0.iter().any(|d| *d == domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn normalize_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_ascii_lowercase()
}

// ============================================================================
// BucketPhase
// ============================================================================

/// Lifecycle phase of a bucket within a host session
///
/// ```text
/// Unbound -> Binding -> {PartiallyBound, FullyBound} -> Listing <-> Idle
/// ```
///
/// Any phase may return to `Unbound`, and a bound bucket may be re-bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BucketPhase {
    #[default]
    Unbound,
    Binding,
    /// ACL or domain discovery failed; the bucket is usable with degraded context
    PartiallyBound,
    FullyBound,
    Listing,
    Idle,
}

impl BucketPhase {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unbound => "Unbound",
            Self::Binding => "Binding",
            Self::PartiallyBound => "PartiallyBound",
            Self::FullyBound => "FullyBound",
            Self::Listing => "Listing",
            Self::Idle => "Idle",
        }
    }

    /// Checks whether moving to `target` is allowed
    #[must_use]
    pub fn can_transition_to(&self, target: BucketPhase) -> bool {
        if matches!(target, Self::Unbound) {
            return true;
        }

        match (self, target) {
            (Self::Unbound, Self::Binding) => true,

            (Self::Binding, Self::PartiallyBound) => true,
            (Self::Binding, Self::FullyBound) => true,

            // Re-bind
            (Self::PartiallyBound | Self::FullyBound | Self::Idle, Self::Binding) => true,

            (Self::PartiallyBound | Self::FullyBound, Self::Listing) => true,
            (Self::Listing, Self::Listing) => true,
            (Self::Listing, Self::Idle) => true,
            (Self::Idle, Self::Listing) => true,

            _ => false,
        }
    }

    /// Moves to `target`, validating the transition
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` if the transition is not allowed
    pub fn transition_to(&mut self, target: BucketPhase) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }

    /// Returns true once ACL and domain discovery have run
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        !matches!(self, Self::Unbound | Self::Binding)
    }
}

impl Display for BucketPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
