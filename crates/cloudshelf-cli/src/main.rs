//! CloudShelf CLI - Command-line host for CloudShelf
//!
//! Provides commands for:
//! - Listing, removing and moving objects in a bucket
//! - Generating and exporting download URLs
//! - Pushing a local folder into a bucket prefix
//! - Viewing and validating configuration
//!
//! Credentials come from `COS_SECRET_ID` / `COS_SECRET_KEY`; the bucket from
//! `--bucket` / `--region` or `CLOUDSHELF_BUCKET` / `CLOUDSHELF_REGION`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cloudshelf_core::config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod session;

use commands::{
    config::ConfigCommand, export::ExportUrlsCommand, info::InfoCommand, ls::LsCommand,
    mv::MvCommand, rm::RmCommand, sync::SyncCommand, url::UrlCommand,
};
use output::{get_formatter, OutputFormat};
use session::CommandContext;

#[derive(Debug, Parser)]
#[command(name = "cloudshelf", version, about = "Browse and sync object storage buckets")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List a directory of the bucket
    Ls(LsCommand),
    /// Remove objects or directories
    Rm(RmCommand),
    /// Move or rename an object or directory
    Mv(MvCommand),
    /// Print download URLs for objects
    Url(UrlCommand),
    /// Show bucket permission, domains and folder totals
    Info(InfoCommand),
    /// Write URLs for every object below a prefix
    ExportUrls(ExportUrlsCommand),
    /// Push a local folder into a bucket prefix
    Sync(SyncCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Default filter: `-v` and `-vv` win over the configured level
fn log_filter(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let filter = log_filter(cli.verbose, &config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(config_path = %config_path.display(), "Loaded configuration");

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing started operations");
                cancel.cancel();
            }
        });
    }

    let ctx = CommandContext {
        format,
        config,
        config_path,
        cancel,
    };

    let result = match &cli.command {
        Commands::Ls(cmd) => cmd.execute(&ctx).await,
        Commands::Rm(cmd) => cmd.execute(&ctx).await,
        Commands::Mv(cmd) => cmd.execute(&ctx).await,
        Commands::Url(cmd) => cmd.execute(&ctx).await,
        Commands::Info(cmd) => cmd.execute(&ctx).await,
        Commands::ExportUrls(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    };

    if let Err(e) = &result {
        get_formatter(format).error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(log_filter(0, "warn"), "warn");
        assert_eq!(log_filter(1, "warn"), "debug");
        assert_eq!(log_filter(3, "warn"), "trace");
    }

    #[test]
    fn test_parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "cloudshelf",
            "--json",
            "sync",
            "./site",
            "--bucket",
            "web-1250000000",
            "--region",
            "ap-guangzhou",
            "--prefix",
            "www",
            "--merge-type",
            "mirror",
            "--policy",
            "newest",
            "--dry-run",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Sync(cmd) => {
                assert_eq!(cmd.prefix, "www");
                assert_eq!(cmd.merge_type, Some(cloudshelf_core::domain::MergeType::Mirror));
                assert_eq!(cmd.policy, Some(cloudshelf_core::domain::MergePolicy::Newest));
                assert!(cmd.dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_merge_type() {
        let result = Cli::try_parse_from([
            "cloudshelf",
            "sync",
            ".",
            "-b",
            "b-1",
            "-r",
            "ap-guangzhou",
            "--merge-type",
            "sideways",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_export_urls_subcommand_name() {
        let cli = Cli::try_parse_from([
            "cloudshelf",
            "export-urls",
            "photos",
            "-b",
            "b-1",
            "-r",
            "ap-guangzhou",
            "--markdown",
            "-o",
            "links.md",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::ExportUrls(ref c) if c.options.markdown));
    }
}
