/*
    append_log.rs - Append-only replicated log (RGA variant without deletes)

    A replicated sequence that only grows at the tail.
    Each element records the element it was appended after; the merged order
    is a depth-first walk of that tree, with concurrent appends after the same
    predecessor visited in ascending Stamp order.

    Properties:
    - Elements are immutable once appended
    - Merge is a union of elements
    - Every replica holding the same elements computes the same total order
    - An element always links back to a strictly smaller counter, so the
      predecessor links form a tree rooted at the start of the log
*/

use super::clock::Stamp;
use super::traits::Crdt;
use crate::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A single element in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogElement<T> {
    /// Unique id of this element
    pub id: Stamp,
    /// Element that was the local tail when this one was appended
    pub after: Option<Stamp>,
    /// Payload
    pub value: T,
}

/// Append-only log CRDT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendLog<T: Clone> {
    /// All elements indexed by id; BTreeMap keeps iteration deterministic
    elements: BTreeMap<Stamp, LogElement<T>>,
}

impl<T: Clone> AppendLog<T> {
    /// Create a new empty log
    pub fn new() -> Self {
        AppendLog { elements: BTreeMap::new() }
    }

    /// Append a value after the current tail, returning the delta
    pub fn append(&mut self, id: Stamp, value: T) -> AppendLog<T> {
        let delta = self.prepare_append(id, value);
        self.elements.extend(delta.elements.iter().map(|(id, e)| (id.clone(), e.clone())));
        delta
    }

    /// Build the delta an append would produce, without applying it
    ///
    /// Merging the returned delta back is equivalent to `append`.
    pub fn prepare_append(&self, id: Stamp, value: T) -> AppendLog<T> {
        let element = LogElement { id: id.clone(), after: self.last_id(), value };
        let mut delta = AppendLog::new();
        delta.elements.insert(id, element);
        delta
    }

    /// Iterate over elements in id order (not merged order)
    pub fn iter(&self) -> impl Iterator<Item = &LogElement<T>> {
        self.elements.values()
    }

    /// Elements in merged order
    pub fn ordered(&self) -> Vec<&LogElement<T>> {
        let mut children: HashMap<Option<&Stamp>, Vec<&LogElement<T>>> = HashMap::new();
        for element in self.elements.values() {
            // Elements whose predecessor has not arrived yet hang off the root
            let parent = element.after.as_ref().filter(|after| self.elements.contains_key(*after));
            children.entry(parent).or_default().push(element);
        }

        let mut result = Vec::with_capacity(self.elements.len());
        let mut stack: Vec<&LogElement<T>> = Vec::new();
        push_children(&mut stack, children.get(&None));

        while let Some(current) = stack.pop() {
            result.push(current);
            push_children(&mut stack, children.get(&Some(&current.id)));
        }
        result
    }

    /// Values in merged order
    pub fn to_vec(&self) -> Vec<T> {
        self.ordered().into_iter().map(|element| element.value.clone()).collect()
    }

    /// Last element in merged order
    pub fn last(&self) -> Option<&LogElement<T>> {
        self.ordered().pop()
    }

    /// Id of the last element in merged order
    pub fn last_id(&self) -> Option<Stamp> {
        self.last().map(|element| element.id.clone())
    }

    /// Check the structure of a remote log before merging it
    ///
    /// Every element must be stored under its own id and link to a
    /// predecessor with a smaller counter. Self links and cycles are
    /// rejected with `Decode`.
    pub fn check_links(&self) -> SyncResult<()> {
        for (id, element) in &self.elements {
            if *id != element.id {
                return Err(SyncError::Decode(format!("log element {} stored under id {}", element.id, id)));
            }
            if let Some(after) = &element.after {
                if after.counter >= element.id.counter {
                    return Err(SyncError::Decode(format!(
                        "log element {} links to {}, which is not an earlier element",
                        element.id, after
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up an element by id
    pub fn get(&self, id: &Stamp) -> Option<&LogElement<T>> {
        self.elements.get(id)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Push siblings so that the smallest stamp is popped first
fn push_children<'a, T>(stack: &mut Vec<&'a LogElement<T>>, siblings: Option<&Vec<&'a LogElement<T>>>) {
    if let Some(siblings) = siblings {
        // Siblings were collected from a BTreeMap, so they are already ascending
        stack.extend(siblings.iter().rev().copied());
    }
}

impl<T: Clone + Send + Sync> Crdt for AppendLog<T> {
    type Value = Vec<T>;

    fn merge(&mut self, other: &Self) -> SyncResult<()> {
        other.check_links()?;
        for (id, element) in &other.elements {
            self.elements.entry(id.clone()).or_insert_with(|| element.clone());
        }
        Ok(())
    }

    fn value(&self) -> Self::Value {
        self.to_vec()
    }

    fn max_counter(&self) -> u64 {
        self.elements.keys().map(|id| id.counter).max().unwrap_or(0)
    }
}

impl<T: Clone> Default for AppendLog<T> {
    fn default() -> Self {
        Self::new()
    }
}
