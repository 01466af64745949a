//! swarmsync - CRDT document sync with replicated access control and keys
//!
//! - [`core_sync`]: the document provider contract and a built-in JSON map engine
//! - [`core_acl`]: who may write, as an add-wins OR-Set of identities
//! - [`core_keys`]: replicated key history, key cache and change encryption
//! - [`core_swarm`]: the change/receive protocol tying the three together

pub mod config;
pub mod core_acl;
pub mod core_crdt;
pub mod core_keys;
pub mod core_swarm;
pub mod core_sync;
pub mod encoding;
pub mod errors;
pub mod logging;
pub mod metrics;

pub use config::{ConfigError, SyncConfig};
pub use errors::{SyncError, SyncResult};
pub use logging::{init_logging, LogLevel};
