//! Shared rulebook cache

use super::{Rulebook, RulebookKey};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Key -> rulebook map shared by a tensor and every tensor derived from it
///
/// Cloning the cache clones the handle, not the map: a network's layers all
/// see the rulebooks built earlier in the same forward pass, and an inverse
/// convolution finds the rulebook of its forward counterpart. Rulebooks are
/// immutable once inserted.
#[derive(Clone, Default)]
pub struct RulebookCache {
    inner: Arc<RwLock<FxHashMap<RulebookKey, Arc<Rulebook>>>>,
}

impl RulebookCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached rulebook for `key`
    pub fn get(&self, key: &RulebookKey) -> Option<Arc<Rulebook>> {
        let found = self.inner.read().get(key).cloned();
        if found.is_some() {
            tracing::trace!(key = %key, "rulebook cache hit");
        }
        found
    }

    /// Store a rulebook, returning the one cached under `key`
    ///
    /// If another thread stored a rulebook for the same key first, that one
    /// wins and is returned.
    pub fn insert(&self, key: RulebookKey, rulebook: Arc<Rulebook>) -> Arc<Rulebook> {
        let mut map = self.inner.write();
        let entry = map.entry(key).or_insert(rulebook);
        Arc::clone(entry)
    }

    /// Number of cached rulebooks
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of the cached keys
    pub fn keys(&self) -> Vec<RulebookKey> {
        self.inner.read().keys().cloned().collect()
    }

    /// Drop every cached rulebook
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Returns true if both handles point at the same map
    pub fn shares_with(&self, other: &RulebookCache) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RulebookCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulebookCache")
            .field("len", &self.len())
            .finish()
    }
}
