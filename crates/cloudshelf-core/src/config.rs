//! Configuration module for CloudShelf.
//!
//! Typed configuration structs mapped to the YAML configuration file, with
//! loading, validation, defaults, and a builder for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bucket::BucketSettings;
use crate::domain::newtypes::DEFAULT_DELIMITER;
use crate::domain::sync_op::{MergePolicy, MergeType};
use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_RETRIES};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for CloudShelf.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listing: ListingConfig,
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub urls: UrlsConfig,
    pub index: IndexConfig,
    pub logging: LoggingConfig,
    pub cos: CosConfig,
}

/// Bucket listing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// Separator used to synthesize directories from flat keys.
    pub delimiter: String,
    /// Entries requested per listing page.
    pub page_limit: u32,
}

/// Folder synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum concurrent transfers.
    pub concurrency: usize,
    /// `mirror` deletes remote-only objects, `merge` keeps them.
    pub merge_type: MergeType,
    /// Policy for paths that exist on both sides and differ.
    pub merge_policy: MergePolicy,
    /// Compute MD5 of local files so unchanged content is skipped even if
    /// the modification time moved.
    pub hash_local_files: bool,
    /// Per-path overrides of `merge_policy`, first match wins.
    pub rules: Vec<PolicyRuleConfig>,
}

/// A glob pattern mapped to a merge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRuleConfig {
    pub pattern: String,
    pub policy: MergePolicy,
}

/// Backoff for transient vendor failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each attempt.
    pub base_delay_ms: u64,
}

/// Download URL settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlsConfig {
    /// Lifetime of signed URLs when none is given on the command line.
    pub default_expiry_secs: u64,
}

/// Local resource index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub enabled: bool,
    /// SQLite database file.
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

/// Tencent COS adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CosConfig {
    /// Path-style endpoint override, e.g. a local gateway.
    /// `None` uses `https://{bucket}.cos.{region}.myqcloud.com`.
    pub endpoint: Option<String>,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cloudshelf/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cloudshelf")
            .join("config.yaml")
    }

    /// Bucket settings derived from the listing, sync, retry and urls sections
    #[must_use]
    pub fn bucket_settings(&self) -> BucketSettings {
        BucketSettings {
            delimiter: self.listing.delimiter.clone(),
            page_limit: self.listing.page_limit,
            concurrency: self.sync.concurrency,
            retry: self.retry.policy(),
            default_expiry: self.urls.default_expiry(),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
    }
}

impl UrlsConfig {
    #[must_use]
    pub fn default_expiry(&self) -> Duration {
        Duration::from_secs(self.default_expiry_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            page_limit: 1000,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            merge_type: MergeType::Merge,
            merge_policy: MergePolicy::Overwrite,
            hash_local_files: true,
            rules: Vec::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

impl Default for UrlsConfig {
    fn default() -> Self {
        Self {
            default_expiry_secs: 3600,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("cloudshelf");
        Self {
            enabled: true,
            path: data_dir.join("index.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for CosConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Longest lifetime COS accepts for a presigned URL.
const MAX_URL_EXPIRY_SECS: u64 = 7 * 24 * 3600;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- listing ---
        if self.listing.delimiter.is_empty() {
            push("listing.delimiter", "must not be empty".into());
        }
        if self.listing.page_limit == 0 || self.listing.page_limit > 1000 {
            push(
                "listing.page_limit",
                format!("must be between 1 and 1000, got {}", self.listing.page_limit),
            );
        }

        // --- sync ---
        if self.sync.concurrency == 0 {
            push("sync.concurrency", "must be greater than 0".into());
        }
        for (i, rule) in self.sync.rules.iter().enumerate() {
            if let Err(e) = glob::Pattern::new(&rule.pattern) {
                push(
                    &format!("sync.rules[{i}].pattern"),
                    format!("invalid glob '{}': {e}", rule.pattern),
                );
            }
        }

        // --- retry ---
        if self.retry.max_retries > 0 && self.retry.base_delay_ms == 0 {
            push(
                "retry.base_delay_ms",
                "must be greater than 0 when retries are enabled".into(),
            );
        }

        // --- urls ---
        if self.urls.default_expiry_secs == 0 {
            push("urls.default_expiry_secs", "must be greater than 0".into());
        } else if self.urls.default_expiry_secs > MAX_URL_EXPIRY_SECS {
            push(
                "urls.default_expiry_secs",
                format!("must not exceed {MAX_URL_EXPIRY_SECS} (7 days)"),
            );
        }

        // --- index ---
        if self.index.enabled && self.index.path.as_os_str().is_empty() {
            push("index.path", "must be set when the index is enabled".into());
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        // --- cos ---
        if let Some(endpoint) = &self.cos.endpoint {
            if let Err(e) = url::Url::parse(endpoint) {
                push("cos.endpoint", format!("invalid URL '{endpoint}': {e}"));
            }
        }
        if self.cos.timeout_secs == 0 {
            push("cos.timeout_secs", "must be greater than 0".into());
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`]; each setter overrides one field.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.listing.delimiter = delimiter.into();
        self
    }

    pub fn page_limit(mut self, limit: u32) -> Self {
        self.config.listing.page_limit = limit;
        self
    }

    pub fn sync_concurrency(mut self, concurrency: usize) -> Self {
        self.config.sync.concurrency = concurrency;
        self
    }

    pub fn merge_type(mut self, merge_type: MergeType) -> Self {
        self.config.sync.merge_type = merge_type;
        self
    }

    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.config.sync.merge_policy = policy;
        self
    }

    pub fn hash_local_files(mut self, enabled: bool) -> Self {
        self.config.sync.hash_local_files = enabled;
        self
    }

    pub fn policy_rule(mut self, pattern: impl Into<String>, policy: MergePolicy) -> Self {
        self.config.sync.rules.push(PolicyRuleConfig {
            pattern: pattern.into(),
            policy,
        });
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn default_expiry_secs(mut self, secs: u64) -> Self {
        self.config.urls.default_expiry_secs = secs;
        self
    }

    pub fn index_enabled(mut self, enabled: bool) -> Self {
        self.config.index.enabled = enabled;
        self
    }

    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index.path = path.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn cos_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.cos.endpoint = Some(endpoint.into());
        self
    }

    pub fn cos_timeout_secs(mut self, secs: u64) -> Self {
        self.config.cos.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.listing.delimiter, "/");
        assert_eq!(cfg.listing.page_limit, 1000);
        assert_eq!(cfg.sync.concurrency, 4);
        assert_eq!(cfg.sync.merge_type, MergeType::Merge);
        assert_eq!(cfg.sync.merge_policy, MergePolicy::Overwrite);
        assert!(cfg.sync.hash_local_files);
        assert!(cfg.sync.rules.is_empty());
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.base_delay_ms, 500);
        assert_eq!(cfg.urls.default_expiry_secs, 3600);
        assert!(cfg.index.enabled);
        assert!(cfg.index.path.ends_with("cloudshelf/index.db"));
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.cos.endpoint.is_none());
        assert_eq!(cfg.cos.timeout_secs, 60);
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
listing:
  delimiter: "/"
  page_limit: 200
sync:
  concurrency: 8
  merge_type: mirror
  merge_policy: newest
  hash_local_files: false
  rules:
    - pattern: "*.psd"
      policy: preserve
retry:
  max_retries: 5
  base_delay_ms: 250
urls:
  default_expiry_secs: 600
index:
  enabled: false
  path: /tmp/cloudshelf-index.db
logging:
  level: debug
cos:
  endpoint: http://127.0.0.1:9000
  timeout_secs: 10
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.listing.page_limit, 200);
        assert_eq!(cfg.sync.concurrency, 8);
        assert_eq!(cfg.sync.merge_type, MergeType::Mirror);
        assert_eq!(cfg.sync.merge_policy, MergePolicy::Newest);
        assert!(!cfg.sync.hash_local_files);
        assert_eq!(
            cfg.sync.rules,
            vec![PolicyRuleConfig {
                pattern: "*.psd".into(),
                policy: MergePolicy::Preserve
            }]
        );
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.urls.default_expiry_secs, 600);
        assert!(!cfg.index.enabled);
        assert_eq!(cfg.index.path, PathBuf::from("/tmp/cloudshelf-index.db"));
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.cos.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(cfg.cos.timeout_secs, 10);
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_fields() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"sync:\n  concurrency: 2\n").unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.sync.concurrency, 2);
        assert_eq!(cfg.sync.merge_policy, MergePolicy::Overwrite);
        assert_eq!(cfg.listing.page_limit, 1000);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.sync.concurrency, 4);
    }

    #[test]
    fn load_returns_error_on_unknown_policy() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"sync:\n  merge_policy: sometimes\n").unwrap();
        tmp.flush().unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn default_path_ends_with_cloudshelf_config() {
        let path = Config::default_path();
        assert!(path.ends_with("cloudshelf/config.yaml"));
    }

    // -- Validation --

    #[test]
    fn validate_collects_every_error() {
        let cfg = ConfigBuilder::new()
            .delimiter("")
            .page_limit(0)
            .sync_concurrency(0)
            .default_expiry_secs(0)
            .log_level("verbose")
            .cos_timeout_secs(0)
            .build();
        let fields: Vec<_> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listing.delimiter",
                "listing.page_limit",
                "sync.concurrency",
                "urls.default_expiry_secs",
                "logging.level",
                "cos.timeout_secs",
            ]
        );
    }

    #[test]
    fn validate_rejects_bad_glob() {
        let errors = ConfigBuilder::new()
            .policy_rule("docs/**", MergePolicy::Preserve)
            .policy_rule("[unclosed", MergePolicy::Newest)
            .build()
            .validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "sync.rules[1].pattern");
    }

    #[test]
    fn validate_rejects_excessive_expiry_and_bad_endpoint() {
        let errors = ConfigBuilder::new()
            .default_expiry_secs(MAX_URL_EXPIRY_SECS + 1)
            .cos_endpoint("not a url")
            .build()
            .validate();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["urls.default_expiry_secs", "cos.endpoint"]);
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "sync.concurrency".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "sync.concurrency: must be greater than 0");
    }

    // -- Builder --

    #[test]
    fn build_validated_returns_errors() {
        let result = ConfigBuilder::new().sync_concurrency(0).build_validated();
        assert!(result.is_err());
        let ok = ConfigBuilder::new()
            .merge_type(MergeType::Mirror)
            .build_validated()
            .unwrap();
        assert_eq!(ok.sync.merge_type, MergeType::Mirror);
    }

    #[test]
    fn bucket_settings_follow_config() {
        let cfg = ConfigBuilder::new()
            .page_limit(50)
            .sync_concurrency(2)
            .max_retries(1)
            .base_delay_ms(10)
            .default_expiry_secs(60)
            .build();
        let settings = cfg.bucket_settings();
        assert_eq!(settings.page_limit, 50);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.retry, RetryPolicy::new(1, Duration::from_millis(10)));
        assert_eq!(settings.default_expiry, Duration::from_secs(60));
    }
}
