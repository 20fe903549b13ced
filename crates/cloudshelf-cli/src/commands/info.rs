//! Info command - Bucket permission, domains and folder totals

use anyhow::{Context, Result};
use clap::Args;
use cloudshelf_core::bucket::{Bucket, BindReport};
use cloudshelf_core::domain::FolderStats;
use tokio_util::sync::CancellationToken;

use super::parse_key;
use crate::output::{format_size, get_formatter, plural};
use crate::session::{open_bucket, BucketArgs, CommandContext};

#[derive(Debug, Args)]
pub struct InfoCommand {
    #[command(flatten)]
    pub target: BucketArgs,

    /// Directory to total; only bucket details are shown when omitted
    pub prefix: Option<String>,
}

struct BucketInfo {
    bind: BindReport,
    stats: Option<FolderStats>,
}

impl InfoCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let mut bucket = open_bucket(&self.target, &ctx.config).await?;

        let info = self.run(&mut bucket, &ctx.cancel).await?;

        if ctx.format.is_json() {
            let mut json = serde_json::json!({
                "bucket": bucket.name(),
                "region": bucket.location(),
                "phase": bucket.phase().to_string(),
                "bind": serde_json::to_value(&info.bind).context("Failed to serialize bind report")?,
            });
            if let (Some(prefix), Some(stats)) = (&self.prefix, info.stats) {
                json["folder"] = serde_json::json!({
                    "prefix": prefix,
                    "file_count": stats.file_count,
                    "total_bytes": stats.total_bytes,
                });
            }
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("{} ({})", bucket.name(), bucket.location()));
        formatter.info(&format!("Permission: {}", info.bind.permission));
        if info.bind.domains.is_empty() {
            formatter.info("Domains:    none");
        } else {
            formatter.info(&format!("Domains:    {}", info.bind.domains.join(", ")));
        }
        for (what, error) in [
            ("ACL", &info.bind.acl_error),
            ("domains", &info.bind.domains_error),
            ("listing", &info.bind.listing_error),
        ] {
            if let Some(e) = error {
                formatter.warn(&format!("Could not read {what}: {e}"));
            }
        }
        if let (Some(prefix), Some(stats)) = (&self.prefix, info.stats) {
            formatter.info(&format!(
                "{prefix}: {} totalling {}",
                plural(stats.file_count, "file"),
                format_size(stats.total_bytes)
            ));
        }
        Ok(())
    }

    async fn run(&self, bucket: &mut Bucket, cancel: &CancellationToken) -> Result<BucketInfo> {
        let bind = bucket.bind(cancel).await.context("Failed to bind bucket")?;
        let stats = match &self.prefix {
            Some(raw) => {
                let prefix = parse_key(raw)?;
                Some(
                    bucket
                        .folder_info(&prefix, cancel)
                        .await
                        .with_context(|| format!("Failed to total '{raw}'"))?,
                )
            }
            None => None,
        };
        Ok(BucketInfo { bind, stats })
    }
}

#[cfg(test)]
mod tests {
    use cloudshelf_core::domain::{Permission, ProviderError};

    use super::super::test_support::*;
    use super::*;

    fn command(prefix: Option<&str>) -> InfoCommand {
        InfoCommand {
            target: BucketArgs {
                bucket: BUCKET.to_string(),
                region: "ap-guangzhou".to_string(),
            },
            prefix: prefix.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_folder_totals() {
        let provider = provider_with(&["docs/a", "docs/nested/bb", "docsx", "other"]);
        let mut bucket = bucket(&provider);

        let info = command(Some("docs/"))
            .run(&mut bucket, &CancellationToken::new())
            .await
            .unwrap();

        let stats = info.stats.unwrap();
        assert_eq!(stats.file_count, 2);
        // Each fixture object holds its own key as content
        assert_eq!(stats.total_bytes, ("docs/a".len() + "docs/nested/bb".len()) as u64);
    }

    #[tokio::test]
    async fn test_acl_failure_is_reported_not_raised() {
        let provider = provider_with(&["a"]);
        provider.set_permission(BUCKET, Permission::Private);
        provider.fail_acl(ProviderError::Permission("no acl access".into()));
        let mut bucket = bucket(&provider);

        let info = command(None)
            .run(&mut bucket, &CancellationToken::new())
            .await
            .unwrap();

        assert!(info.bind.acl_error.is_some());
        assert_eq!(info.bind.permission, Permission::Unknown);
        assert!(info.stats.is_none());
    }
}
