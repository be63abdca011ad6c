//! The host's response cache contract.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Minimal contract of the per-instance response cache.
pub trait ResponseCache: Send + Sync {
    /// Whether `key` is currently cached.
    fn contains(&self, key: &str) -> bool;

    /// Remove `key`, returning whether it was present.
    fn remove(&self, key: &str) -> bool;

    /// Cache `value` under `key`, replacing any previous value.
    fn insert(&self, key: String, value: Vec<u8>);
}

/// Response cache kept in a hash map.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ResponseCache for MemoryCache {
    fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn insert(&self, key: String, value: Vec<u8>) {
        self.entries.write().insert(key, value);
    }
}
