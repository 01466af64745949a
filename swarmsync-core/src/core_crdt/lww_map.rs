/*
    lww_map.rs - Last-Write-Wins Map CRDT

    A map where every key holds an independent last-write-wins register.
    Conflicts are resolved by the write stamp: the highest (counter, replica)
    wins. Removal is a write of `None`, so a remove and a concurrent put are
    ordered like any two puts.

    Use cases:
    - Document fields edited by many peers
    - Any keyed state where the latest write should win
*/

use super::clock::Stamp;
use super::traits::Crdt;
use crate::errors::SyncResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single register in the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LWWEntry<V> {
    /// Current value, `None` once removed
    pub value: Option<V>,
    /// Stamp of the write that produced `value`
    pub stamp: Stamp,
}

impl<V> LWWEntry<V> {
    /// Whether a write with `stamp` would replace this entry
    fn should_update(&self, stamp: &Stamp) -> bool {
        stamp > &self.stamp
    }
}

/// Last-Write-Wins Map CRDT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LWWMap<V: Clone> {
    entries: BTreeMap<String, LWWEntry<V>>,
}

impl<V: Clone> LWWMap<V> {
    /// Create a new empty map
    pub fn new() -> Self {
        LWWMap { entries: BTreeMap::new() }
    }

    /// Write a value (or a removal) under `stamp`
    ///
    /// Returns true if the write won against the current entry.
    pub fn write(&mut self, key: String, value: Option<V>, stamp: Stamp) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) if !entry.should_update(&stamp) => false,
            Some(entry) => {
                entry.value = value;
                entry.stamp = stamp;
                true
            }
            None => {
                self.entries.insert(key, LWWEntry { value, stamp });
                true
            }
        }
    }

    /// Put a value
    pub fn put(&mut self, key: impl Into<String>, value: V, stamp: Stamp) -> bool {
        self.write(key.into(), Some(value), stamp)
    }

    /// Remove a key
    pub fn remove(&mut self, key: impl Into<String>, stamp: Stamp) -> bool {
        self.write(key.into(), None, stamp)
    }

    /// Get a live value
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key).and_then(|entry| entry.value.as_ref())
    }

    /// Get the raw entry, including removals
    pub fn entry(&self, key: &str) -> Option<&LWWEntry<V>> {
        self.entries.get(key)
    }

    /// Check if a key holds a live value
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over live (key, value) pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| entry.value.as_ref().map(|value| (key, value)))
    }

    /// Iterate over all entries, removals included
    pub fn raw_entries(&self) -> impl Iterator<Item = (&String, &LWWEntry<V>)> {
        self.entries.iter()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if the map has no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a delta containing only the given keys
    pub fn delta_for<'a>(&self, keys: impl IntoIterator<Item = &'a String>) -> LWWMap<V> {
        let entries = keys
            .into_iter()
            .filter_map(|key| self.entries.get(key).map(|entry| (key.clone(), entry.clone())))
            .collect();
        LWWMap { entries }
    }
}

impl<V: Clone + Send + Sync> Crdt for LWWMap<V> {
    type Value = BTreeMap<String, V>;

    fn merge(&mut self, other: &Self) -> SyncResult<()> {
        for (key, entry) in &other.entries {
            self.write(key.clone(), entry.value.clone(), entry.stamp.clone());
        }
        Ok(())
    }

    fn value(&self) -> Self::Value {
        self.iter().map(|(key, value)| (key.clone(), value.clone())).collect()
    }

    fn max_counter(&self) -> u64 {
        self.entries.values().map(|entry| entry.stamp.counter).max().unwrap_or(0)
    }
}

impl<V: Clone> Default for LWWMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> FromIterator<(String, LWWEntry<V>)> for LWWMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, LWWEntry<V>)>>(iter: I) -> Self {
        let mut map = LWWMap::new();
        for (key, entry) in iter {
            map.write(key, entry.value, entry.stamp);
        }
        map
    }
}
