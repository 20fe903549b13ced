//! Ls command - List a bucket directory
//!
//! Provides the `cloudshelf ls` CLI command which lists one directory level
//! (or, with `--recursive`, every key) below a prefix. A single page is
//! fetched unless `--all` is given.

use anyhow::{Context, Result};
use clap::Args;
use cloudshelf_core::bucket::{Bucket, ListOptions, ListOutcome};
use cloudshelf_core::domain::{BucketPhase, Resource};
use tokio_util::sync::CancellationToken;

use crate::output::{format_size, get_formatter, plural};
use crate::session::{open_bucket, BucketArgs, CommandContext};

#[derive(Debug, Args)]
pub struct LsCommand {
    #[command(flatten)]
    pub target: BucketArgs,

    /// Directory to list; the bucket root when omitted
    #[arg(default_value = "")]
    pub prefix: String,

    /// List every key below the prefix instead of one level
    #[arg(long, short = 'R')]
    pub recursive: bool,

    /// Keep paging until the listing is exhausted
    #[arg(long)]
    pub all: bool,
}

impl LsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let mut bucket = open_bucket(&self.target, &ctx.config).await?;

        let outcome = self.run(&mut bucket, &ctx.cancel).await?;
        let resources = bucket.resources();

        if ctx.format.is_json() {
            let json = serde_json::json!({
                "bucket": bucket.name(),
                "prefix": bucket.current_prefix(),
                "exhausted": outcome.exhausted,
                "resources": serde_json::to_value(resources)
                    .context("Failed to serialize listing")?,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        for resource in resources {
            formatter.line(&listing_line(resource, bucket.delimiter()));
        }
        formatter.info(&format!(
            "{} in {}/{}",
            plural(resources.len(), "entry"),
            bucket.name(),
            bucket.current_prefix()
        ));
        if !outcome.exhausted {
            formatter.info("More entries available; use --all to fetch them");
        }
        Ok(())
    }

    async fn run(&self, bucket: &mut Bucket, cancel: &CancellationToken) -> Result<ListOutcome> {
        if bucket.phase() == BucketPhase::Unbound {
            bucket.bind(cancel).await.context("Failed to bind bucket")?;
        }
        let options = if self.recursive {
            ListOptions::recursive(self.prefix.clone())
        } else {
            ListOptions::prefix(self.prefix.clone())
        };
        let outcome = if self.all {
            bucket.list_all(options, cancel).await
        } else {
            bucket.list_resources(options, cancel).await
        };
        outcome.with_context(|| format!("Failed to list '{}'", self.prefix))
    }
}

/// One `ls` row: size, modification time and name
fn listing_line(resource: &Resource, delimiter: &str) -> String {
    let name = resource.key().name(delimiter);
    if resource.is_directory() {
        return format!("{:>10}  {:<16}  {name}{delimiter}", "DIR", "");
    }
    let size = resource.size().map(format_size).unwrap_or_default();
    let modified = resource
        .modified()
        .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!("{size:>10}  {modified:<16}  {name}")
}
