/*
    clock.rs - Lamport stamps for replica-local causal ordering

    Every write to a replicated structure is tagged with a Stamp:
    - counter: Lamport counter, max(observed) + 1 on every local write
    - replica: id of the replica that issued the write

    Stamps are totally ordered by (counter, replica), which gives every
    replica the same winner for concurrent writes without wall clocks.

    Remote counters are capped at MAX_REMOTE_COUNTER before they are merged,
    so a clock that observed them still has room for local ticks.
*/

use crate::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Replica identifier
pub type ReplicaId = String;

/// Largest Lamport counter accepted from another replica
pub const MAX_REMOTE_COUNTER: u64 = u64::MAX >> 1;

/// Unique, totally ordered tag for a single write
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    /// Lamport counter at the time of the write
    pub counter: u64,
    /// Replica that performed the write
    pub replica: ReplicaId,
}

impl Stamp {
    pub fn new(counter: u64, replica: impl Into<ReplicaId>) -> Self {
        Stamp { counter, replica: replica.into() }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.replica)
    }
}

/// Lamport clock owned by a single replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamportClock {
    replica: ReplicaId,
    counter: u64,
}

impl LamportClock {
    /// Create a clock for the given replica
    pub fn new(replica: impl Into<ReplicaId>) -> Self {
        LamportClock { replica: replica.into(), counter: 0 }
    }

    /// Create a clock with a random replica id
    pub fn random() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Issue a new stamp for a local write
    pub fn tick(&mut self) -> SyncResult<Stamp> {
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| SyncError::Internal(format!("Lamport clock of {} exhausted", self.replica)))?;
        Ok(Stamp::new(self.counter, self.replica.clone()))
    }

    /// Reject a remote counter too large to observe
    ///
    /// Call on a decoded delta before merging anything from it.
    pub fn check_remote(counter: u64) -> SyncResult<()> {
        if counter > MAX_REMOTE_COUNTER {
            return Err(SyncError::Decode(format!(
                "Lamport counter {} exceeds the accepted maximum {}",
                counter, MAX_REMOTE_COUNTER
            )));
        }
        Ok(())
    }

    /// Advance past a counter observed from another replica
    pub fn observe(&mut self, counter: u64) {
        self.counter = self.counter.max(counter);
    }

    /// Current counter value
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Replica owning this clock
    pub fn replica(&self) -> &str {
        &self.replica
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_increments() {
        let mut clock = LamportClock::new("a");
        assert_eq!(clock.tick().unwrap(), Stamp::new(1, "a"));
        assert_eq!(clock.tick().unwrap(), Stamp::new(2, "a"));
        assert_eq!(clock.counter(), 2);
    }

    #[test]
    fn test_observe_advances_past_remote() {
        let mut clock = LamportClock::new("a");
        clock.observe(Stamp::new(10, "b").counter);
        assert_eq!(clock.tick().unwrap(), Stamp::new(11, "a"));

        // Observing an older stamp never moves the clock backwards
        clock.observe(3);
        assert_eq!(clock.counter(), 11);
    }

    #[test]
    fn test_tick_reports_exhaustion_instead_of_wrapping() {
        let mut clock = LamportClock::new("a");
        clock.observe(u64::MAX);
        assert!(matches!(clock.tick(), Err(SyncError::Internal(_))));
        assert_eq!(clock.counter(), u64::MAX);
    }

    #[test]
    fn test_check_remote_bounds() {
        assert!(LamportClock::check_remote(0).is_ok());
        assert!(LamportClock::check_remote(MAX_REMOTE_COUNTER).is_ok());
        assert!(matches!(LamportClock::check_remote(MAX_REMOTE_COUNTER + 1), Err(SyncError::Decode(_))));
        assert!(matches!(LamportClock::check_remote(u64::MAX), Err(SyncError::Decode(_))));
    }

    #[test]
    fn test_stamp_ordering_ties_on_replica() {
        let a = Stamp::new(5, "a");
        let b = Stamp::new(5, "b");
        let c = Stamp::new(6, "a");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_random_replicas_differ() {
        let c1 = LamportClock::random();
        let c2 = LamportClock::random();
        assert_ne!(c1.replica(), c2.replica());
    }
}
