//! Url command - Print download URLs
//!
//! The bucket is bound first so that private buckets get signed URLs and a
//! bound custom domain replaces the vendor host.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use cloudshelf_core::bucket::{Bucket, UrlFormat};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::parse_key;
use crate::output::get_formatter;
use crate::session::{open_bucket, BucketArgs, CommandContext};

/// URL options shared by `url` and `export-urls`
#[derive(Debug, Clone, Args)]
pub struct UrlOptions {
    /// Lifetime of signed URLs in seconds (default from `urls.default_expiry_secs`)
    #[arg(long, value_name = "SECONDS")]
    pub expires: Option<u64>,

    /// Print Markdown links instead of bare URLs
    #[arg(long)]
    pub markdown: bool,

    /// Custom domain to use for the host, if bound to the bucket
    #[arg(long)]
    pub domain: Option<String>,
}

impl UrlOptions {
    pub fn expiry(&self) -> Option<Duration> {
        self.expires.map(Duration::from_secs)
    }

    pub fn format(&self) -> UrlFormat {
        if self.markdown {
            UrlFormat::Markdown
        } else {
            UrlFormat::Plain
        }
    }

    /// Bind the bucket and apply `--domain`
    pub async fn prepare(&self, bucket: &mut Bucket, cancel: &CancellationToken) -> Result<()> {
        let report = bucket.bind(cancel).await.context("Failed to bind bucket")?;
        if let Some(e) = &report.acl_error {
            warn!(error = %e, "Bucket ACL unknown, URLs are not signed");
        }
        if let Some(domain) = &self.domain {
            if !bucket.domains().contains(domain) {
                anyhow::bail!("Domain '{domain}' is not bound to {}", bucket.name());
            }
            bucket.use_domain(domain);
        }
        Ok(())
    }
}

#[derive(Debug, Args)]
pub struct UrlCommand {
    #[command(flatten)]
    pub target: BucketArgs,

    /// Object keys
    #[arg(required = true)]
    pub keys: Vec<String>,

    #[command(flatten)]
    pub options: UrlOptions,
}

impl UrlCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let mut bucket = open_bucket(&self.target, &ctx.config).await?;
        self.options.prepare(&mut bucket, &ctx.cancel).await?;

        let urls = self.render(&bucket)?;

        if ctx.format.is_json() {
            let entries: Vec<_> = self
                .keys
                .iter()
                .zip(&urls)
                .map(|(key, url)| serde_json::json!({"key": key, "url": url}))
                .collect();
            formatter.print_json(&serde_json::json!({ "urls": entries }));
        } else {
            for url in &urls {
                formatter.line(url);
            }
        }
        Ok(())
    }

    fn render(&self, bucket: &Bucket) -> Result<Vec<String>> {
        let format = self.options.format();
        self.keys
            .iter()
            .map(|raw| {
                let key = parse_key(raw)?;
                let url = bucket
                    .generate_url(&key, self.options.expiry())
                    .with_context(|| format!("Failed to generate URL for '{raw}'"))?;
                Ok(format.render(key.name(bucket.delimiter()), &url))
            })
            .collect()
    }
}
