//! Sync command - Push a local folder into a bucket prefix
//!
//! Provides the `cloudshelf sync` CLI command which:
//! 1. Builds the folder sync from the `sync` config section and flags
//! 2. Snapshots the local folder and the remote prefix
//! 3. Prints the plan (`--dry-run`) or executes it with live progress
//! 4. Prints the per-path report; any failed path fails the command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cloudshelf_core::config::SyncConfig;
use cloudshelf_core::domain::{ItemOutcome, MergePolicy, MergeType, OperationKind, SyncPlan, SyncReport};
use cloudshelf_sync::{FolderSync, PolicyEngine, SyncEvent};
use tokio::sync::mpsc;
use tracing::info;

use super::describe;
use crate::output::{format_duration_ms, get_formatter, plural, OutputFormatter};
use crate::session::{open_bucket, BucketArgs, CommandContext};

#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(flatten)]
    pub target: BucketArgs,

    /// Local directory to push
    pub local: PathBuf,

    /// Remote prefix the directory maps to; the bucket root when omitted
    #[arg(long, short = 'p', default_value = "")]
    pub prefix: String,

    /// `mirror` also deletes remote-only objects, `merge` keeps them
    #[arg(long, value_name = "TYPE")]
    pub merge_type: Option<MergeType>,

    /// `overwrite`, `preserve` or `newest` for paths that differ
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<MergePolicy>,

    /// Maximum concurrent transfers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Compare by size and modification time only
    #[arg(long)]
    pub no_hash: bool,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let json = ctx.format.is_json();
        let sync = self.folder_sync(&ctx.config.sync);
        let mut bucket = open_bucket(&self.target, &ctx.config).await?;

        info!(
            local = %self.local.display(),
            prefix = %self.prefix,
            merge_type = %sync.merge_type(),
            dry_run = self.dry_run,
            "Starting sync"
        );

        if self.dry_run {
            let prepared = sync
                .prepare(&self.local, &bucket, &self.prefix, &ctx.cancel)
                .await
                .context("Failed to prepare sync")?;
            return print_plan(&*formatter, json, &prepared.plan);
        }

        // Human output follows progress live; JSON prints one final document
        let (events, printer) = if json {
            (None, None)
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(tokio::spawn(print_events(rx))))
        };

        let report = sync
            .run(&self.local, &mut bucket, &self.prefix, events, &ctx.cancel)
            .await
            .context("Sync failed")?;
        if let Some(printer) = printer {
            printer.await.context("Progress printer panicked")?;
        }

        print_report(&*formatter, json, &report)?;
        if report.is_partial_failure() {
            anyhow::bail!("{} failed", plural(report.failed(), "path"));
        }
        Ok(())
    }

    /// Settings from the config file, overridden by flags
    fn folder_sync(&self, config: &SyncConfig) -> FolderSync {
        let policy = PolicyEngine::new(self.policy.unwrap_or(config.merge_policy), &config.rules);
        FolderSync::new(self.merge_type.unwrap_or(config.merge_type), policy)
            .with_concurrency(self.concurrency.unwrap_or(config.concurrency))
            .with_hashing(config.hash_local_files && !self.no_hash)
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn plan_lines(plan: &SyncPlan) -> Vec<String> {
    plan.iter()
        .filter(|op| op.kind != OperationKind::Skip)
        .map(|op| format!("{:<6}  {}", op.kind.as_str(), op.path))
        .collect()
}

fn print_plan(formatter: &dyn OutputFormatter, json: bool, plan: &SyncPlan) -> Result<()> {
    if json {
        let operations: Vec<_> = plan.iter().collect();
        formatter.print_json(&serde_json::json!({
            "dry_run": true,
            "operations": serde_json::to_value(operations).context("Failed to serialize plan")?,
        }));
        return Ok(());
    }

    if plan.is_noop() {
        formatter.success("Already up to date");
        return Ok(());
    }
    formatter.success("Dry run, no changes made");
    for line in plan_lines(plan) {
        formatter.info(&line);
    }
    formatter.info(&format!(
        "{} to add, {} to update, {} to delete, {} unchanged",
        plan.count(OperationKind::Add),
        plan.count(OperationKind::Update),
        plan.count(OperationKind::Delete),
        plan.count(OperationKind::Skip)
    ));
    Ok(())
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        if let SyncEvent::OperationFinished {
            path,
            kind,
            outcome,
            completed,
            total,
        } = event
        {
            if kind != OperationKind::Skip {
                println!("  [{completed}/{total}] {kind} {path}: {outcome}");
            }
        }
    }
}

fn print_report(formatter: &dyn OutputFormatter, json: bool, report: &SyncReport) -> Result<()> {
    if json {
        let value = serde_json::to_value(report).context("Failed to serialize report")?;
        formatter.print_json(&value);
        return Ok(());
    }

    let changed = report
        .entries
        .iter()
        .filter(|e| e.operation.kind != OperationKind::Skip)
        .count();
    if changed == 0 {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!(
            "Sync completed in {}",
            format_duration_ms(report.duration_ms)
        ));
    }

    for kind in [OperationKind::Add, OperationKind::Update, OperationKind::Delete] {
        let done = report
            .entries
            .iter()
            .filter(|e| e.operation.kind == kind && e.outcome == ItemOutcome::Succeeded)
            .count();
        if done > 0 {
            formatter.info(&format!("{:<8}{}", format!("{kind}:"), plural(done, "file")));
        }
    }
    if report.aborted() > 0 {
        formatter.warn(&format!("{} cancelled", plural(report.aborted(), "operation")));
    }
    for entry in report.entries.iter().filter(|e| e.outcome.is_failure()) {
        formatter.error(&format!("{}: {}", entry.operation.path, describe(&entry.outcome)));
    }
    Ok(())
}
