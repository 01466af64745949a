/*
    or_set.rs - Observed-Remove Set CRDT (add-wins)

    A set that supports add and remove operations.
    Every add is tagged with a unique Stamp; a remove tombstones only the
    tags it has observed. Consequences:
    - concurrent add and remove of the same element: the add survives
    - re-adding after a remove creates a fresh tag, so the element is back
    - merge is a union of tags and tombstones

    Used for the access-control list.
*/

use super::clock::Stamp;
use super::traits::Crdt;
use crate::errors::SyncResult;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Observed-Remove Set CRDT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ORSet<T: Clone + Eq + Hash> {
    /// Live add tags per element; an element exists if it has at least one
    elements: HashMap<T, HashSet<Stamp>>,

    /// Removed (element, tag) pairs, kept so late adds stay removed
    tombstones: HashSet<(T, Stamp)>,
}

impl<T: Clone + Eq + Hash> ORSet<T> {
    /// Create a new empty OR-Set
    pub fn new() -> Self {
        ORSet { elements: HashMap::new(), tombstones: HashSet::new() }
    }

    /// Add an element under a fresh tag, returning the delta
    pub fn add(&mut self, element: T, tag: Stamp) -> ORSet<T> {
        let mut delta = ORSet::new();
        delta.elements.entry(element.clone()).or_default().insert(tag.clone());

        if !self.tombstones.contains(&(element.clone(), tag.clone())) {
            self.elements.entry(element).or_default().insert(tag);
        }
        delta
    }

    /// Remove an element, tombstoning every tag observed locally
    ///
    /// Returns the delta. Removing an absent element yields an empty delta.
    pub fn remove(&mut self, element: &T) -> ORSet<T> {
        let mut delta = ORSet::new();
        if let Some(tags) = self.elements.remove(element) {
            for tag in tags {
                self.tombstones.insert((element.clone(), tag.clone()));
                delta.tombstones.insert((element.clone(), tag));
            }
        }
        delta
    }

    /// Check if an element is in the set
    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains_key(element)
    }

    /// Get all elements in the set
    pub fn elements(&self) -> Vec<T> {
        self.elements.keys().cloned().collect()
    }

    /// Iterate over the elements without cloning
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.keys()
    }

    /// Get the number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether this state carries neither adds nor tombstones
    pub fn is_noop(&self) -> bool {
        self.elements.is_empty() && self.tombstones.is_empty()
    }

    /// Get live add tags for a specific element
    pub fn tags(&self, element: &T) -> Option<&HashSet<Stamp>> {
        self.elements.get(element)
    }

    /// Number of tombstones retained
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Elements named by tombstones, whether or not they are still live
    pub fn removed(&self) -> impl Iterator<Item = &T> {
        self.tombstones.iter().map(|(element, _)| element)
    }
}

impl<T: Clone + Eq + Hash + Send + Sync> Crdt for ORSet<T> {
    type Value = Vec<T>;

    fn merge(&mut self, other: &Self) -> SyncResult<()> {
        for (element, other_tags) in &other.elements {
            let entry = self.elements.entry(element.clone()).or_default();
            entry.reserve(other_tags.len());

            for tag in other_tags {
                if !self.tombstones.contains(&(element.clone(), tag.clone())) {
                    entry.insert(tag.clone());
                }
            }
        }

        for tombstone in &other.tombstones {
            if let Some(tags) = self.elements.get_mut(&tombstone.0) {
                tags.remove(&tombstone.1);
            }
            self.tombstones.insert(tombstone.clone());
        }

        self.elements.retain(|_, tags| !tags.is_empty());
        Ok(())
    }

    fn value(&self) -> Self::Value {
        self.elements()
    }

    fn max_counter(&self) -> u64 {
        let live = self.elements.values().flatten().map(|tag| tag.counter);
        let dead = self.tombstones.iter().map(|(_, tag)| tag.counter);
        live.chain(dead).max().unwrap_or(0)
    }
}

impl<T: Clone + Eq + Hash> Default for ORSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
