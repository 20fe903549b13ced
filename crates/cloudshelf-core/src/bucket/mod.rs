//! Bucket orchestration
//!
//! A [`Bucket`] is the host-facing handle on one remote bucket. It owns the
//! listing state (loaded resources, pagination cursor, selection), the
//! access context (permission, bound domains) and the lifecycle phase, and
//! it reaches the vendor only through an [`IProviderAdapter`].
//!
//! All mutation goes through `&mut Bucket`. Hosts that need to share a
//! bucket between tasks wrap it in a [`SharedBucket`], whose mutex is the
//! per-bucket session lock.

mod error;
mod listing;
mod mutations;
mod transfer;
mod urls;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::bucket_state::{BoundDomains, BucketPhase, Permission};
use crate::domain::errors::ProviderError;
use crate::domain::newtypes::{directory_prefix, BucketId, Cursor, ObjectKey, DEFAULT_DELIMITER};
use crate::domain::resource::Resource;
use crate::ports::{BucketContext, IProviderAdapter, IResourceIndex};
use crate::retry::RetryPolicy;

pub use error::BucketError;
pub use listing::{ListOptions, ListOutcome};
pub use transfer::BucketHandle;
pub use urls::UrlFormat;

/// A bucket shared between tasks; the mutex serializes session mutations
pub type SharedBucket = Arc<tokio::sync::Mutex<Bucket>>;

/// Tunables applied to every bucket operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSettings {
    /// Key delimiter used to synthesize directories
    pub delimiter: String,
    /// Entries requested per listing page
    pub page_limit: u32,
    /// Maximum concurrent vendor calls for bulk moves
    pub concurrency: usize,
    /// Backoff applied to transient failures
    pub retry: RetryPolicy,
    /// Lifetime of generated URLs when the caller gives none
    pub default_expiry: Duration,
}

impl Default for BucketSettings {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            page_limit: 1000,
            concurrency: 4,
            retry: RetryPolicy::default(),
            default_expiry: Duration::from_secs(3600),
        }
    }
}

/// What happened during [`Bucket::bind`]
///
/// Each step runs even if an earlier one failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BindReport {
    pub permission: Permission,
    pub domains: Vec<String>,
    #[serde(skip)]
    pub acl_error: Option<ProviderError>,
    #[serde(skip)]
    pub domains_error: Option<ProviderError>,
    #[serde(skip)]
    pub listing_error: Option<ProviderError>,
}

impl BindReport {
    /// Returns true if ACL or domain discovery failed
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.acl_error.is_some() || self.domains_error.is_some()
    }
}

/// A remote bucket bound to a provider adapter
pub struct Bucket {
    id: BucketId,
    context: BucketContext,
    adapter: Arc<dyn IProviderAdapter>,
    index: Option<Arc<dyn IResourceIndex>>,
    settings: BucketSettings,

    phase: BucketPhase,
    permission: Permission,
    domains: BoundDomains,

    listing: Vec<Resource>,
    listed_keys: HashSet<String>,
    current_prefix: String,
    recursive: bool,
    cursor: Option<Cursor>,
    exhausted: bool,

    selection: BTreeSet<ObjectKey>,
    moved_prefixes: Vec<(String, String)>,
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("vendor", &self.adapter.vendor())
            .field("phase", &self.phase)
            .field("permission", &self.permission)
            .field("listed", &self.listing.len())
            .finish_non_exhaustive()
    }
}

impl Bucket {
    /// Create an unbound bucket
    pub fn new(
        context: BucketContext,
        adapter: Arc<dyn IProviderAdapter>,
        settings: BucketSettings,
    ) -> Self {
        Self {
            id: BucketId::new(),
            context,
            adapter,
            index: None,
            settings,
            phase: BucketPhase::Unbound,
            permission: Permission::Unknown,
            domains: BoundDomains::new(),
            listing: Vec::new(),
            listed_keys: HashSet::new(),
            current_prefix: String::new(),
            recursive: false,
            cursor: None,
            exhausted: false,
            selection: BTreeSet::new(),
            moved_prefixes: Vec::new(),
        }
    }

    /// Use a fixed identifier, e.g. one persisted by the host
    #[must_use]
    pub fn with_id(mut self, id: BucketId) -> Self {
        self.id = id;
        self
    }

    /// Mirror confirmed listing changes into a persisted index
    #[must_use]
    pub fn with_index(mut self, index: Arc<dyn IResourceIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Wrap into a [`SharedBucket`]
    #[must_use]
    pub fn into_shared(self) -> SharedBucket {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn id(&self) -> BucketId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.context.name
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.context.region
    }

    #[must_use]
    pub fn context(&self) -> &BucketContext {
        &self.context
    }

    #[must_use]
    pub fn settings(&self) -> &BucketSettings {
        &self.settings
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.settings.delimiter
    }

    #[must_use]
    pub fn phase(&self) -> BucketPhase {
        self.phase
    }

    #[must_use]
    pub fn permission(&self) -> Permission {
        self.permission
    }

    #[must_use]
    pub fn domains(&self) -> &BoundDomains {
        &self.domains
    }

    /// Resources merged so far, in merge order
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.listing
    }

    /// Prefix of the current listing
    #[must_use]
    pub fn current_prefix(&self) -> &str {
        &self.current_prefix
    }

    /// Continuation cursor; `None` once the listing is exhausted
    #[must_use]
    pub fn pagination_cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Returns true once the vendor reported the last page
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Directory moves performed in this session as `(old, new)` prefixes
    #[must_use]
    pub fn moved_prefixes(&self) -> &[(String, String)] {
        &self.moved_prefixes
    }

    /// Index of the most recent moved prefix containing `path`, if any
    ///
    /// Sync operations touching the same moved prefix must not run
    /// concurrently with each other.
    #[must_use]
    pub fn moved_prefix_lane(&self, path: &str) -> Option<usize> {
        let delimiter = self.delimiter();
        self.moved_prefixes
            .iter()
            .enumerate()
            .rev()
            .find(|(_, (old, new))| {
                path.starts_with(directory_prefix(old, delimiter).as_str())
                    || path.starts_with(directory_prefix(new, delimiter).as_str())
            })
            .map(|(idx, _)| idx)
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Discover ACL, bound domains and the first listing page, in that order
    ///
    /// A failing step is logged and recorded in the report; later steps
    /// still run. Only an invalid phase transition is returned as an error.
    #[tracing::instrument(skip(self, cancel), fields(bucket = %self.context.name))]
    pub async fn bind(&mut self, cancel: &CancellationToken) -> Result<BindReport, BucketError> {
        self.phase.transition_to(BucketPhase::Binding)?;
        let mut report = BindReport::default();

        match self.adapter.get_acl(&self.context).await {
            Ok(permission) => self.permission = permission,
            Err(e) => {
                warn!(error = %e, "Could not read bucket ACL, treating as public");
                self.permission = Permission::Unknown;
                report.acl_error = Some(e);
            }
        }
        report.permission = self.permission;

        match self.adapter.get_domains(&self.context).await {
            Ok(domains) => self.domains.replace(domains),
            Err(e) => {
                warn!(error = %e, "Could not read bound domains");
                report.domains_error = Some(e);
            }
        }
        report.domains = self.domains.iter().map(str::to_string).collect();

        let bound = if report.is_partial() {
            BucketPhase::PartiallyBound
        } else {
            BucketPhase::FullyBound
        };
        self.phase.transition_to(bound)?;

        if let Err(e) = self.list_resources(ListOptions::root(), cancel).await {
            warn!(error = %e, "Initial listing failed");
            report.listing_error = Some(e.into_provider_error());
        }

        info!(
            permission = %self.permission,
            domains = report.domains.len(),
            partial = report.is_partial(),
            "Bucket bound"
        );
        Ok(report)
    }

    /// Forget all session state and return to `Unbound`
    pub fn unbind(&mut self) {
        self.phase = BucketPhase::Unbound;
        self.permission = Permission::Unknown;
        self.reset_listing("", false);
        self.selection.clear();
        self.moved_prefixes.clear();
    }

    /// Override the permission used for URL generation
    pub fn set_permission(&mut self, permission: Permission) {
        self.permission = permission;
    }

    /// Make `domain` the most recently used domain for generated URLs
    pub fn use_domain(&mut self, domain: &str) {
        self.domains.touch(domain);
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Add a key to the selection
    pub fn select(&mut self, key: ObjectKey) {
        self.selection.insert(key);
    }

    /// Remove a key from the selection
    pub fn deselect(&mut self, key: &ObjectKey) {
        self.selection.remove(key);
    }

    /// Toggle a directory together with every loaded descendant
    ///
    /// Returns true if the directory ended up selected.
    pub fn toggle_directory(&mut self, prefix: &ObjectKey) -> bool {
        let delimiter = self.settings.delimiter.clone();
        let descendants: Vec<ObjectKey> = self
            .listing
            .iter()
            .filter(|r| r.key().is_descendant_of(prefix.as_str(), &delimiter))
            .map(|r| r.key().clone())
            .collect();

        if self.selection.contains(prefix) {
            self.selection.remove(prefix);
            for key in &descendants {
                self.selection.remove(key);
            }
            false
        } else {
            self.selection.insert(prefix.clone());
            self.selection.extend(descendants);
            true
        }
    }

    /// Select every loaded resource
    pub fn select_all(&mut self) {
        self.selection
            .extend(self.listing.iter().map(|r| r.key().clone()));
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Selected keys in key order
    pub fn selected(&self) -> impl Iterator<Item = &ObjectKey> {
        self.selection.iter()
    }

    #[must_use]
    pub fn is_selected(&self, key: &ObjectKey) -> bool {
        self.selection.contains(key)
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn reset_listing(&mut self, prefix: &str, recursive: bool) {
        self.listing.clear();
        self.listed_keys.clear();
        self.current_prefix = prefix.to_string();
        self.recursive = recursive;
        self.cursor = None;
        self.exhausted = false;
    }

    /// Entry the current listing would show for `resource`, if any
    ///
    /// For a delimiter listing, resources deeper than the current prefix
    /// collapse into the directory entry of their first segment.
    fn view_entry_for(&self, resource: &Resource) -> Option<Resource> {
        let key = resource.key().as_str();
        let rest = key.strip_prefix(self.current_prefix.as_str())?;
        if rest.is_empty() {
            return None;
        }
        let delimiter = self.delimiter();
        if self.recursive {
            return (!listing::is_marker_object(resource, &self.current_prefix, delimiter))
                .then(|| resource.clone());
        }
        match rest.find(delimiter) {
            Some(idx)
                if idx + delimiter.len() < rest.len()
                    || resource.is_directory()
                    || rest.ends_with(delimiter) =>
            {
                let dir_key = format!("{}{}", self.current_prefix, &rest[..idx + delimiter.len()]);
                let key = ObjectKey::new(dir_key).ok()?;
                Resource::directory(key, delimiter, resource.vendor()).ok()
            }
            _ => Some(resource.clone()),
        }
    }

    fn insert_listed(&mut self, resource: Resource) -> bool {
        if self.listed_keys.insert(resource.key().as_str().to_string()) {
            self.listing.push(resource);
            true
        } else {
            false
        }
    }

    fn replace_listed(&mut self, resource: Resource) {
        let key = resource.key().as_str();
        if let Some(existing) = self.listing.iter_mut().find(|r| r.key().as_str() == key) {
            *existing = resource;
        } else {
            self.insert_listed(resource);
        }
    }

    fn remove_listed(&mut self, key: &str) {
        if self.listed_keys.remove(key) {
            self.listing.retain(|r| r.key().as_str() != key);
        }
    }

    async fn index_upsert(&self, resources: &[Resource]) {
        if let Some(index) = &self.index {
            if let Err(e) = index.upsert(&self.id, resources).await {
                warn!(error = %e, count = resources.len(), "Index upsert failed");
            }
        }
    }

    async fn index_remove(&self, keys: &[ObjectKey]) {
        if let Some(index) = &self.index {
            if let Err(e) = index.remove(&self.id, keys).await {
                warn!(error = %e, count = keys.len(), "Index remove failed");
            }
        }
    }

    async fn index_rename(&self, renames: &[(ObjectKey, ObjectKey)]) {
        if let Some(index) = &self.index {
            if let Err(e) = index.rename(&self.id, renames).await {
                warn!(error = %e, count = renames.len(), "Index rename failed");
            }
        }
    }
}

/// Bind several buckets at once
///
/// Each bucket pages on its own; a slow or failing bucket does not hold up
/// the others. Results are in input order.
pub async fn bind_all(
    buckets: &[SharedBucket],
    cancel: &CancellationToken,
) -> Vec<Result<BindReport, BucketError>> {
    futures_util::future::join_all(buckets.iter().map(|shared| async move {
        let mut bucket = shared.lock().await;
        bucket.bind(cancel).await
    }))
    .await
}
