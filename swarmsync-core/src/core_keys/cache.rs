//! Bounded cache of materialized key handles
//!
//! Least-recently-used eviction over a fixed capacity. All access goes
//! through one mutex, so a lookup never observes a half-finished eviction.
//! Evicted keys are dropped, which zeroizes their material.

use super::key::{KeyId, SymmetricKey};
use crate::errors::{handle_poison, SyncResult};
use hashlink::LruCache;
use std::sync::Mutex;

/// Default number of keys kept materialized
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 64;

/// LRU cache from key id to key material
pub struct KeyCache {
    entries: Mutex<LruCache<KeyId, SymmetricKey>>,
    capacity: usize,
}

impl KeyCache {
    /// Create a cache holding at most `capacity` keys (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        KeyCache { entries: Mutex::new(LruCache::new(capacity)), capacity }
    }

    /// Look up a key, marking it most recently used
    pub fn get(&self, key_id: &KeyId) -> SyncResult<Option<SymmetricKey>> {
        let mut entries = self.entries.lock().map_err(handle_poison)?;
        Ok(entries.get(key_id).cloned())
    }

    /// Insert or replace a key, evicting the least recently used one if full
    pub fn insert(&self, key_id: KeyId, key: SymmetricKey) -> SyncResult<()> {
        let mut entries = self.entries.lock().map_err(handle_poison)?;
        entries.insert(key_id, key);
        Ok(())
    }

    /// Insert several keys under a single lock acquisition
    pub fn insert_many(&self, keys: impl IntoIterator<Item = (KeyId, SymmetricKey)>) -> SyncResult<()> {
        let mut entries = self.entries.lock().map_err(handle_poison)?;
        for (key_id, key) in keys {
            entries.insert(key_id, key);
        }
        Ok(())
    }

    /// Drop a key from the cache; returns true if it was present
    pub fn evict(&self, key_id: &KeyId) -> SyncResult<bool> {
        let mut entries = self.entries.lock().map_err(handle_poison)?;
        Ok(entries.remove(key_id).is_some())
    }

    /// Drop every cached key
    pub fn clear(&self) -> SyncResult<()> {
        self.entries.lock().map_err(handle_poison)?.clear();
        Ok(())
    }

    /// Whether a key is cached, without touching recency
    pub fn contains(&self, key_id: &KeyId) -> SyncResult<bool> {
        Ok(self.entries.lock().map_err(handle_poison)?.contains_key(key_id))
    }

    /// Number of cached keys
    pub fn len(&self) -> SyncResult<usize> {
        Ok(self.entries.lock().map_err(handle_poison)?.len())
    }

    /// Maximum number of cached keys
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_CACHE_CAPACITY)
    }
}
