//! Derived directory view over a flat key set
//!
//! Object stores are flat; the hierarchy users see is computed from keys and
//! a delimiter. [`ResourceTree`] is rebuilt from a listing whenever it is
//! needed and is never kept alongside the listing as separate state.

use std::collections::BTreeMap;

use serde::Serialize;

use super::newtypes::{directory_prefix, ObjectKey};
use super::resource::Resource;

/// File count and byte total below a prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FolderStats {
    pub file_count: usize,
    pub total_bytes: u64,
}

/// Read-only hierarchical view of a set of resources
#[derive(Debug, Clone)]
pub struct ResourceTree {
    delimiter: String,
    entries: BTreeMap<String, Resource>,
}

impl ResourceTree {
    /// Build a tree from a flat listing
    ///
    /// Later entries win when two resources share a key. Intermediate
    /// directories implied by deep keys are synthesized.
    #[must_use]
    pub fn build<'a, I>(resources: I, delimiter: &str) -> Self
    where
        I: IntoIterator<Item = &'a Resource>,
    {
        let mut entries = BTreeMap::new();
        for resource in resources {
            entries.insert(resource.key().as_str().to_string(), resource.clone());
        }

        let implied: Vec<String> = entries
            .keys()
            .flat_map(|k| ancestor_prefixes(k, delimiter))
            .collect();
        for prefix in implied {
            if entries.contains_key(&prefix) {
                continue;
            }
            let Ok(key) = ObjectKey::new(prefix.clone()) else {
                continue;
            };
            let vendor = entries
                .values()
                .next()
                .map(Resource::vendor)
                .unwrap_or(super::resource::Vendor::Memory);
            if let Ok(dir) = Resource::directory(key, delimiter, vendor) {
                entries.insert(prefix, dir);
            }
        }

        Self {
            delimiter: delimiter.to_string(),
            entries,
        }
    }

    /// Direct children of `prefix` (empty prefix = bucket root)
    #[must_use]
    pub fn children(&self, prefix: &str) -> Vec<&Resource> {
        let dir = directory_prefix(prefix, &self.delimiter);
        self.range_below(&dir)
            .filter(|r| r.key().parent_prefix(&self.delimiter) == dir)
            .collect()
    }

    /// All leaf objects below `prefix`, at any depth
    #[must_use]
    pub fn descendants(&self, prefix: &str) -> Vec<&Resource> {
        let dir = directory_prefix(prefix, &self.delimiter);
        self.range_below(&dir).filter(|r| !r.is_directory()).collect()
    }

    /// File count and total size below `prefix`
    #[must_use]
    pub fn folder_stats(&self, prefix: &str) -> FolderStats {
        self.descendants(prefix)
            .into_iter()
            .fold(FolderStats::default(), |mut acc, r| {
                acc.file_count += 1;
                acc.total_bytes += r.size().unwrap_or(0);
                acc
            })
    }

    /// Number of entries including synthesized directories
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn range_below<'a>(&'a self, dir: &str) -> impl Iterator<Item = &'a Resource> + 'a {
        let dir = dir.to_string();
        let end = dir.clone();
        self.entries
            .range(dir.clone()..)
            .take_while(move |(k, _)| k.starts_with(end.as_str()))
            .filter(move |(k, _)| **k != dir)
            .map(|(_, r)| r)
    }
}

fn ancestor_prefixes(key: &str, delimiter: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let trimmed = key.strip_suffix(delimiter).unwrap_or(key);
    let mut search_from = 0;
    while let Some(pos) = trimmed[search_from..].find(delimiter) {
        let end = search_from + pos + delimiter.len();
        prefixes.push(trimmed[..end].to_string());
        search_from = end;
    }
    prefixes
}
