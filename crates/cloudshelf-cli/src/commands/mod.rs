pub mod config;
pub mod export;
pub mod info;
pub mod ls;
pub mod mv;
pub mod rm;
pub mod sync;
pub mod url;

use anyhow::{Context, Result};
use cloudshelf_core::domain::{BulkReport, ItemOutcome, ObjectKey};

use crate::output::{plural, OutputFormatter};

/// Parse a command-line key, naming the argument on failure
pub(crate) fn parse_key(raw: &str) -> Result<ObjectKey> {
    ObjectKey::new(raw.to_string()).with_context(|| format!("Invalid key '{raw}'"))
}

pub(crate) fn describe(outcome: &ItemOutcome) -> String {
    match outcome {
        ItemOutcome::Failed(e) => format!("failed: {e}"),
        other => other.label().to_string(),
    }
}

/// Print a remove/move report; errors if any key failed
pub(crate) fn finish_bulk(
    formatter: &dyn OutputFormatter,
    json: bool,
    verb: &str,
    report: &BulkReport,
) -> Result<()> {
    let failed: Vec<_> = report
        .entries
        .iter()
        .filter(|e| e.outcome.is_failure())
        .collect();
    let succeeded = report
        .entries
        .iter()
        .filter(|e| e.outcome == ItemOutcome::Succeeded)
        .count();

    if json {
        let value = serde_json::to_value(report).context("Failed to serialize report")?;
        formatter.print_json(&value);
    } else {
        if succeeded > 0 {
            formatter.success(&format!("{verb} {}", plural(succeeded, "object")));
        }
        for entry in &failed {
            formatter.error(&format!("{}: {}", entry.key, describe(&entry.outcome)));
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} failed", failed.len(), report.entries.len())
    }
}
