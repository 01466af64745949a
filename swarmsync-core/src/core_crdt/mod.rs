/*
    CRDT subsystem - Conflict-Free Replicated Data Types

    State-based CRDTs backing the ACL, the keychain and the built-in
    document engine.
*/

pub mod append_log;
pub mod clock;
pub mod lww_map;
pub mod or_set;
pub mod traits;

pub use append_log::{AppendLog, LogElement};
pub use clock::{LamportClock, ReplicaId, Stamp, MAX_REMOTE_COUNTER};
pub use lww_map::{LWWEntry, LWWMap};
pub use or_set::ORSet;
pub use traits::Crdt;
