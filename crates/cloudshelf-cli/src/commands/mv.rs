//! Mv command - Move or rename objects and directories

use anyhow::{Context, Result};
use clap::Args;
use cloudshelf_core::bucket::Bucket;
use cloudshelf_core::domain::BulkReport;
use tokio_util::sync::CancellationToken;

use super::{finish_bulk, parse_key};
use crate::output::get_formatter;
use crate::session::{open_bucket, BucketArgs, CommandContext};

#[derive(Debug, Args)]
pub struct MvCommand {
    #[command(flatten)]
    pub target: BucketArgs,

    /// Key to move; a trailing delimiter moves the whole directory
    pub source: String,

    /// Destination key, or the new last segment with `--rename`
    pub destination: String,

    /// Treat the destination as a new name in the same directory
    #[arg(long)]
    pub rename: bool,
}

impl MvCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let mut bucket = open_bucket(&self.target, &ctx.config).await?;

        let report = self.run(&mut bucket, &ctx.cancel).await?;
        finish_bulk(&*formatter, ctx.format.is_json(), "Moved", &report)
    }

    async fn run(&self, bucket: &mut Bucket, cancel: &CancellationToken) -> Result<BulkReport> {
        let source = parse_key(&self.source)?;
        let report = if self.rename {
            bucket
                .rename_resource(&source, &self.destination, cancel)
                .await
        } else {
            let destination = parse_key(&self.destination)?;
            bucket.move_resources(&source, &destination, cancel).await
        };
        report.with_context(|| format!("Failed to move '{}'", self.source))
    }
}
