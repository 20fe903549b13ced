//! Rm command - Remove objects and directories
//!
//! Keys ending with the delimiter remove the whole directory. Every key is
//! attempted; the command fails afterwards if any removal failed.

use anyhow::Result;
use clap::Args;
use cloudshelf_core::bucket::Bucket;
use cloudshelf_core::domain::{BulkReport, ObjectKey};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{finish_bulk, parse_key};
use crate::output::get_formatter;
use crate::session::{open_bucket, BucketArgs, CommandContext};

#[derive(Debug, Args)]
pub struct RmCommand {
    #[command(flatten)]
    pub target: BucketArgs,

    /// Keys to remove; `photos/` removes the directory and its contents
    #[arg(required = true)]
    pub keys: Vec<String>,
}

impl RmCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let keys = self
            .keys
            .iter()
            .map(|k| parse_key(k))
            .collect::<Result<Vec<_>>>()?;

        let mut bucket = open_bucket(&self.target, &ctx.config).await?;
        let report = run(&mut bucket, &keys, &ctx.cancel).await;

        finish_bulk(&*formatter, ctx.format.is_json(), "Removed", &report)
    }
}

async fn run(bucket: &mut Bucket, keys: &[ObjectKey], cancel: &CancellationToken) -> BulkReport {
    info!(count = keys.len(), "Removing keys");
    bucket.remove_resources(keys, cancel).await
}
