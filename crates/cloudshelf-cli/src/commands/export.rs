//! Export-urls command - Write URLs for every object below a prefix
//!
//! Lists the prefix recursively, selects everything listed and writes one
//! URL (or Markdown link) per line, to a file or stdout.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use cloudshelf_core::bucket::{Bucket, ListOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::url::UrlOptions;
use crate::output::{get_formatter, plural};
use crate::session::{open_bucket, BucketArgs, CommandContext};

#[derive(Debug, Args)]
pub struct ExportUrlsCommand {
    #[command(flatten)]
    pub target: BucketArgs,

    /// Directory to export; the whole bucket when omitted
    #[arg(default_value = "")]
    pub prefix: String,

    /// File to write; stdout when omitted
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub options: UrlOptions,
}

impl ExportUrlsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let mut bucket = open_bucket(&self.target, &ctx.config).await?;

        let urls = self.run(&mut bucket, &ctx.cancel).await?;

        if let Some(path) = &self.output {
            let mut body = urls.join("\n");
            body.push('\n');
            tokio::fs::write(path, body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), count = urls.len(), "Exported URLs");
        }

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "count": urls.len(),
                "output": self.output.as_ref().map(|p| p.display().to_string()),
                "urls": urls,
            }));
        } else if let Some(path) = &self.output {
            formatter.success(&format!(
                "Wrote {} to {}",
                plural(urls.len(), "URL"),
                path.display()
            ));
        } else {
            for url in &urls {
                formatter.line(url);
            }
        }
        Ok(())
    }

    async fn run(&self, bucket: &mut Bucket, cancel: &CancellationToken) -> Result<Vec<String>> {
        self.options.prepare(bucket, cancel).await?;
        bucket
            .list_all(ListOptions::recursive(self.prefix.clone()), cancel)
            .await
            .with_context(|| format!("Failed to list '{}'", self.prefix))?;

        bucket.clear_selection();
        bucket.select_all();
        bucket
            .selection_urls(self.options.expiry(), self.options.format())
            .context("Failed to generate URLs")
    }
}
