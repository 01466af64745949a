/*
    traits.rs - Core CRDT trait definitions

    Every replicated structure in this crate is state-based:
    - local writes return a delta (a partial state of the same type)
    - deltas and full states are merged with the same join operation
    - merge is commutative, associative and idempotent
*/

use crate::errors::SyncResult;

/// Core trait that all CRDTs must implement
pub trait Crdt: Clone + Send + Sync {
    /// The type of value this CRDT represents
    type Value;

    /// Merge another replica (or a delta) into this one
    fn merge(&mut self, other: &Self) -> SyncResult<()>;

    /// Get the current value
    fn value(&self) -> Self::Value;

    /// Highest Lamport counter observed in this state
    ///
    /// Replicas advance their clock past this after merging so that
    /// their next write sorts after everything they have seen.
    fn max_counter(&self) -> u64;
}
