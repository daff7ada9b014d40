//! Permanent store of extracted metadata keyed by fully qualified type name.

use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{metadata::Metadata, pipeline::Mode};

#[derive(Debug, Clone)]
struct CacheEntry {
    /// Mode the metadata was extracted in, which decides its relationship scope.
    mode: Mode,
    meta: Arc<Metadata>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Configuration session the entries belong to.
    session: u64,
}

/// Read-mostly cache. Values are fully built before the write lock is taken, so readers never
/// see a partially populated entry.
#[derive(Debug, Default)]
pub struct MetadataCache(RwLock<CacheState>);

impl MetadataCache {
    pub fn get(&self, qualified_name: &str) -> Option<Arc<Metadata>> {
        self.0
            .read()
            .entries
            .get(qualified_name)
            .map(|entry| entry.meta.clone())
    }

    /// The cached metadata together with the mode it was extracted in.
    pub fn entry(&self, qualified_name: &str) -> Option<(Mode, Arc<Metadata>)> {
        self.0
            .read()
            .entries
            .get(qualified_name)
            .map(|entry| (entry.mode, entry.meta.clone()))
    }

    /// Stores `meta` if it was produced under the current session.
    ///
    /// An existing entry wins unless it was built by `Inspect` and `meta` comes from `Scan`, in
    /// which case the scan result replaces it. Returns the cached value and whether `meta` was
    /// stored. Results from a stale session are handed back without being cached.
    pub fn store(&self, session: u64, mode: Mode, meta: Metadata) -> (Arc<Metadata>, bool) {
        let mut writer = self.0.write();
        if writer.session != session {
            tracing::debug!(
                "[MetadataCache::store] Dropping {} from stale session {session} (current {})",
                meta.qualified_name,
                writer.session
            );
            return (Arc::new(meta), false);
        }
        if let Some(existing) = writer.entries.get(&meta.qualified_name) {
            if existing.mode == Mode::Scan || mode == Mode::Inspect {
                return (existing.meta.clone(), false);
            }
            tracing::debug!(
                "[MetadataCache::store] Replacing inspect-mode entry for {}",
                meta.qualified_name
            );
        }
        let meta = Arc::new(meta);
        writer.entries.insert(
            meta.qualified_name.clone(),
            CacheEntry {
                mode,
                meta: meta.clone(),
            },
        );
        (meta, true)
    }

    /// Drops every entry and moves the cache to `session`.
    pub fn reset(&self, session: u64) {
        let mut writer = self.0.write();
        writer.entries.clear();
        writer.session = session;
    }

    pub fn clear(&self) {
        self.0.write().entries.clear();
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys = self
            .0
            .read()
            .entries
            .keys()
            .cloned()
            .collect::<Vec<String>>();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> BTreeMap<String, Arc<Metadata>> {
        self.0
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.meta.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
