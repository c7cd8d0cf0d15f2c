//! Named response caches.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::request::CachedResponse;

/// Trait for named caches of path to response
pub trait CacheStorage: Send + Sync {
    /// Names of every cache, in lookup order.
    fn cache_names(&self) -> Vec<String>;

    /// Look up `path` in one cache.
    fn lookup(&self, cache: &str, path: &str) -> Option<CachedResponse>;

    /// Write all `entries` into `cache` at once, creating it if needed.
    fn put_all(&self, cache: &str, entries: Vec<(String, CachedResponse)>);

    /// Remove a cache. Returns whether it existed.
    fn delete_cache(&self, cache: &str) -> bool;

    /// First hit for `path` across every cache.
    fn match_any(&self, path: &str) -> Option<CachedResponse> {
        self.cache_names()
            .iter()
            .find_map(|cache| self.lookup(cache, path))
    }
}

type Caches = BTreeMap<String, HashMap<String, CachedResponse>>;

/// In-process cache storage, searched in cache-name order.
#[derive(Clone, Default)]
pub struct MemoryCacheStorage {
    caches: Arc<Mutex<Caches>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cache: &str, path: &str, response: CachedResponse) {
        self.lock()
            .entry(cache.to_string())
            .or_default()
            .insert(path.to_string(), response);
    }

    /// Number of entries in `cache`, or `None` if it does not exist.
    pub fn len_of(&self, cache: &str) -> Option<usize> {
        self.lock().get(cache).map(HashMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, Caches> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn cache_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lookup(&self, cache: &str, path: &str) -> Option<CachedResponse> {
        self.lock().get(cache)?.get(path).cloned()
    }

    fn put_all(&self, cache: &str, entries: Vec<(String, CachedResponse)>) {
        self.lock()
            .entry(cache.to_string())
            .or_default()
            .extend(entries);
    }

    fn delete_cache(&self, cache: &str) -> bool {
        self.lock().remove(cache).is_some()
    }
}
