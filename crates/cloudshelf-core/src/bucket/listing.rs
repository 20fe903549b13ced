//! Paginated listing and remote descendant queries

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Bucket, BucketError};
use crate::domain::bucket_state::BucketPhase;
use crate::domain::errors::DomainError;
use crate::domain::newtypes::{directory_prefix, Cursor, ObjectKey};
use crate::domain::resource::Resource;
use crate::domain::tree::{FolderStats, ResourceTree};
use crate::ports::{ListPage, ListRequest};

/// Parameters for [`Bucket::list_resources`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Directory to list; empty for the bucket root
    pub prefix: String,
    /// `None` starts a fresh listing; `Some` continues the current one
    pub cursor: Option<Cursor>,
    /// List every key below the prefix instead of one directory level
    pub recursive: bool,
    /// Overrides the configured page size
    pub limit: Option<u32>,
}

impl ListOptions {
    /// Fresh listing of the bucket root
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Fresh listing of one directory level
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Fresh recursive listing below `prefix`
    #[must_use]
    pub fn recursive(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            recursive: true,
            ..Self::default()
        }
    }

    /// Continue from `cursor`
    #[must_use]
    pub fn after(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of merging one or more pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOutcome {
    /// Resources newly merged into the listing
    pub added: usize,
    /// True once the vendor reported the last page
    pub exhausted: bool,
}

/// Zero-size placeholder for a directory, hidden from listings
pub(super) fn is_marker_object(resource: &Resource, prefix: &str, delimiter: &str) -> bool {
    resource.size() == Some(0)
        && (resource.key().as_str().ends_with(delimiter) || resource.key().as_str() == prefix)
}

impl Bucket {
    /// Fetch one page and merge it into the listing
    ///
    /// A `None` cursor resets the listing to the requested prefix; a cursor
    /// appends to the current listing. Keys already merged are not added
    /// again. If `cancel` fires while the page is in flight, the page is
    /// discarded and the listing keeps its previous state.
    #[tracing::instrument(skip(self, cancel), fields(bucket = %self.context.name))]
    pub async fn list_resources(
        &mut self,
        options: ListOptions,
        cancel: &CancellationToken,
    ) -> Result<ListOutcome, BucketError> {
        let prefix = directory_prefix(&options.prefix, &self.settings.delimiter);
        if options.cursor.is_some()
            && (prefix != self.current_prefix || options.recursive != self.recursive)
        {
            return Err(DomainError::ValidationFailed(format!(
                "cursor does not belong to the listing of '{}'",
                self.current_prefix
            ))
            .into());
        }

        self.phase.transition_to(BucketPhase::Listing)?;
        let result = self.fetch_and_merge(prefix, options, cancel).await;
        self.phase.transition_to(BucketPhase::Idle)?;
        result
    }

    /// Continue the current listing from the stored cursor
    pub async fn load_more(&mut self, cancel: &CancellationToken) -> Result<ListOutcome, BucketError> {
        if self.exhausted {
            return Ok(ListOutcome {
                added: 0,
                exhausted: true,
            });
        }
        let options = ListOptions {
            prefix: self.current_prefix.clone(),
            cursor: self.cursor.clone(),
            recursive: self.recursive,
            limit: None,
        };
        self.list_resources(options, cancel).await
    }

    /// Reset to `options.prefix` and page until the listing is exhausted
    pub async fn list_all(
        &mut self,
        options: ListOptions,
        cancel: &CancellationToken,
    ) -> Result<ListOutcome, BucketError> {
        let mut total = self
            .list_resources(ListOptions { cursor: None, ..options }, cancel)
            .await?;
        while !total.exhausted {
            let page = self.load_more(cancel).await?;
            total.added += page.added;
            total.exhausted = page.exhausted;
        }
        Ok(total)
    }

    /// Every stored object strictly below `prefix`, straight from the vendor
    ///
    /// Does not touch the listing state. Keys that merely share a textual
    /// prefix (`a/bx` for `a/b`) are excluded, and so are directory markers.
    pub async fn collect_descendants(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>, BucketError> {
        self.scan_prefix(prefix, false, cancel).await
    }

    /// Every stored key under the directory `prefix`, markers included
    ///
    /// Unlike [`Bucket::collect_descendants`] this keeps zero-size markers
    /// and the directory's own marker key, so mutations leave no trace of
    /// the directory behind.
    pub(super) async fn collect_stored(
        &self,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>, BucketError> {
        self.scan_prefix(prefix, true, cancel).await
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        keep_markers: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>, BucketError> {
        let delimiter = self.settings.delimiter.as_str();
        let dir = directory_prefix(prefix, delimiter);
        let mut request = ListRequest {
            prefix: dir.clone(),
            delimiter: None,
            cursor: None,
            limit: self.settings.page_limit,
        };

        let mut found = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(BucketError::Cancelled);
            }
            let page = self.fetch_page(&request, cancel).await?;
            found.extend(page.objects.into_iter().filter(|r| {
                if keep_markers {
                    (!dir.is_empty() && r.key().as_str() == dir)
                        || r.key().is_descendant_of(&dir, delimiter)
                } else {
                    r.key().is_descendant_of(&dir, delimiter)
                        && !is_marker_object(r, &dir, delimiter)
                }
            }));
            match page.next_cursor {
                Some(cursor) => request.cursor = Some(cursor),
                None => break,
            }
        }

        debug!(prefix = %dir, count = found.len(), keep_markers, "Collected descendants");
        Ok(found)
    }

    /// File count and total size below `prefix`
    pub async fn folder_info(
        &self,
        prefix: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<FolderStats, BucketError> {
        let descendants = self.collect_descendants(prefix.as_str(), cancel).await?;
        let tree = ResourceTree::build(&descendants, &self.settings.delimiter);
        Ok(tree.folder_stats(prefix.as_str()))
    }

    /// Derived directory view of the loaded listing
    #[must_use]
    pub fn tree(&self) -> ResourceTree {
        ResourceTree::build(&self.listing, &self.settings.delimiter)
    }

    async fn fetch_page(
        &self,
        request: &ListRequest,
        cancel: &CancellationToken,
    ) -> Result<ListPage, BucketError> {
        let adapter = &self.adapter;
        let ctx = &self.context;
        let fetch = self.settings.retry.run("list_page", cancel, || async move {
            adapter.list_page(ctx, request).await
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BucketError::Cancelled),
            result = fetch => result.map_err(|e| match e {
                crate::domain::ProviderError::Aborted => BucketError::Cancelled,
                other => BucketError::Provider(other),
            }),
        }
    }

    async fn fetch_and_merge(
        &mut self,
        prefix: String,
        options: ListOptions,
        cancel: &CancellationToken,
    ) -> Result<ListOutcome, BucketError> {
        let request = ListRequest {
            prefix: prefix.clone(),
            delimiter: (!options.recursive).then(|| self.settings.delimiter.clone()),
            cursor: options.cursor.clone(),
            limit: options.limit.unwrap_or(self.settings.page_limit),
        };

        let page = self.fetch_page(&request, cancel).await?;

        if options.cursor.is_none() {
            self.reset_listing(&prefix, options.recursive);
        }
        self.exhausted = page.next_cursor.is_none();
        self.cursor = page.next_cursor.clone();

        let added = self.merge_page(page);
        self.index_upsert(&added).await;

        debug!(
            prefix = %prefix,
            added = added.len(),
            exhausted = self.exhausted,
            "Merged listing page"
        );
        Ok(ListOutcome {
            added: added.len(),
            exhausted: self.exhausted,
        })
    }

    /// Merge a page, returning the resources that were not listed yet
    fn merge_page(&mut self, page: ListPage) -> Vec<Resource> {
        let delimiter = self.settings.delimiter.clone();
        let prefix = self.current_prefix.clone();
        let vendor = self.adapter.vendor();
        let mut added = Vec::new();

        for common in page.common_prefixes {
            if common.is_empty() || common == prefix {
                continue;
            }
            let directory = ObjectKey::new(common)
                .and_then(|key| Resource::directory(key, &delimiter, vendor));
            match directory {
                Ok(dir) => {
                    if self.insert_listed(dir.clone()) {
                        added.push(dir);
                    }
                }
                Err(e) => warn!(error = %e, "Skipping malformed common prefix"),
            }
        }

        for object in page.objects {
            if is_marker_object(&object, &prefix, &delimiter) {
                continue;
            }
            if self.insert_listed(object.clone()) {
                added.push(object);
            }
        }

        added
    }
}
