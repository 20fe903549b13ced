//! Wiring shared by the bucket commands
//!
//! Loads credentials from the environment, builds the COS adapter from the
//! `cos` config section and opens the resource index when it is enabled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use cloudshelf_cache::{DatabasePool, SqliteResourceIndex};
use cloudshelf_core::bucket::Bucket;
use cloudshelf_core::config::Config;
use cloudshelf_core::domain::{BucketId, Vendor};
use cloudshelf_core::ports::{BucketContext, IProviderAdapter};
use cloudshelf_cos::{CosClient, CosProvider, Credentials};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::output::OutputFormat;

/// State every command receives from `main`
pub struct CommandContext {
    pub format: OutputFormat,
    pub config: Config,
    pub config_path: PathBuf,
    /// Fired on Ctrl+C
    pub cancel: CancellationToken,
}

/// Which bucket a command works on
#[derive(Debug, Clone, Args)]
pub struct BucketArgs {
    /// Bucket name including the APPID suffix, e.g. `media-1250000000`
    #[arg(long, short = 'b', env = "CLOUDSHELF_BUCKET")]
    pub bucket: String,

    /// Bucket region, e.g. `ap-guangzhou`
    #[arg(long, short = 'r', env = "CLOUDSHELF_REGION")]
    pub region: String,
}

impl BucketArgs {
    pub fn context(&self) -> BucketContext {
        BucketContext::new(self.bucket.clone(), self.region.clone())
    }

    pub fn bucket_id(&self) -> BucketId {
        BucketId::for_location(Vendor::TencentCos.as_str(), &self.region, &self.bucket)
    }
}

/// COS adapter built from environment credentials and the `cos` section
pub fn cos_provider(config: &Config) -> Result<CosProvider> {
    let credentials = Credentials::from_env()
        .context("COS credentials missing; set COS_SECRET_ID and COS_SECRET_KEY")?;
    let mut client =
        CosClient::with_timeout(credentials, Duration::from_secs(config.cos.timeout_secs))
            .context("Failed to create COS client")?;
    if let Some(endpoint) = &config.cos.endpoint {
        client = client
            .with_endpoint(endpoint)
            .context("Invalid cos.endpoint")?;
    }
    Ok(CosProvider::new(client))
}

/// Resource index from the `index` section, `None` when disabled
///
/// An index that cannot be opened is logged and skipped; it only mirrors
/// what the vendor already holds.
pub async fn open_index(config: &Config) -> Option<Arc<SqliteResourceIndex>> {
    if !config.index.enabled {
        return None;
    }
    match DatabasePool::new(&config.index.path).await {
        Ok(pool) => Some(Arc::new(SqliteResourceIndex::new(pool.pool().clone()))),
        Err(e) => {
            warn!(path = %config.index.path.display(), error = %e, "Resource index unavailable");
            None
        }
    }
}

/// Bucket over any adapter with the configured settings and index
pub async fn bucket_with(
    args: &BucketArgs,
    config: &Config,
    adapter: Arc<dyn IProviderAdapter>,
) -> Bucket {
    let mut bucket = Bucket::new(args.context(), adapter, config.bucket_settings())
        .with_id(args.bucket_id());
    if let Some(index) = open_index(config).await {
        bucket = bucket.with_index(index);
    }
    info!(bucket = %args.bucket, region = %args.region, "Opened bucket");
    bucket
}

/// Bucket backed by COS
pub async fn open_bucket(args: &BucketArgs, config: &Config) -> Result<Bucket> {
    let provider = cos_provider(config)?;
    Ok(bucket_with(args, config, Arc::new(provider)).await)
}
