//! Merge policy engine
//!
//! Decides what happens to a path that exists on both sides with different
//! content. Rules from configuration are glob patterns matched against the
//! relative path, first match wins; unmatched paths use the default policy.

use cloudshelf_core::config::{PolicyRuleConfig, SyncConfig};
use cloudshelf_core::domain::MergePolicy;
use glob::Pattern;
use tracing::{debug, trace, warn};

use crate::snapshot::EntryState;

/// Outcome of applying a policy to a changed path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Replace the remote object with the local file
    Upload,
    /// Leave the remote object as it is
    Keep,
}

/// Engine that evaluates merge policy rules
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    rules: Vec<(Pattern, MergePolicy)>,
    default_policy: MergePolicy,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(MergePolicy::default(), &[])
    }
}

impl PolicyEngine {
    /// Creates a PolicyEngine from a default policy and a list of rules
    ///
    /// Rules with invalid glob patterns are logged and skipped.
    pub fn new(default_policy: MergePolicy, rules: &[PolicyRuleConfig]) -> Self {
        let compiled: Vec<(Pattern, MergePolicy)> = rules
            .iter()
            .filter_map(|rule| match Pattern::new(&rule.pattern) {
                Ok(pattern) => Some((pattern, rule.policy)),
                Err(e) => {
                    warn!(
                        pattern = %rule.pattern,
                        error = %e,
                        "Skipping invalid merge rule pattern"
                    );
                    None
                }
            })
            .collect();

        debug!(
            rules_count = compiled.len(),
            default = %default_policy,
            "PolicyEngine initialized"
        );

        Self {
            rules: compiled,
            default_policy,
        }
    }

    /// Engine for the `sync` configuration section
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.merge_policy, &config.rules)
    }

    /// Policy for a relative path
    pub fn evaluate(&self, relative_path: &str) -> MergePolicy {
        if let Some((pattern, policy)) = self
            .rules
            .iter()
            .find(|(pattern, _)| pattern.matches(relative_path))
        {
            trace!(
                path = %relative_path,
                pattern = %pattern,
                policy = %policy,
                "Merge rule matched"
            );
            return *policy;
        }
        self.default_policy
    }

    /// Decide whether a changed path is uploaded
    ///
    /// `Newest` uploads only when both modification times are known and the
    /// local one is strictly later, compared to whole seconds.
    pub fn decide(&self, relative_path: &str, local: &EntryState, remote: &EntryState) -> UpdateDecision {
        let decision = match self.evaluate(relative_path) {
            MergePolicy::Overwrite => UpdateDecision::Upload,
            MergePolicy::Preserve => UpdateDecision::Keep,
            MergePolicy::Newest => match (local.modified, remote.modified) {
                (Some(l), Some(r)) if l.timestamp() > r.timestamp() => UpdateDecision::Upload,
                _ => UpdateDecision::Keep,
            },
        };
        trace!(path = %relative_path, ?decision, "Update decided");
        decision
    }

    pub fn default_policy(&self) -> MergePolicy {
        self.default_policy
    }

    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }
}
