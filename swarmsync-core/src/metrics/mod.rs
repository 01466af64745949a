//! Metrics for sync, ACL and keychain activity
//!
//! Recording goes through the `metrics` facade and is a no-op until the
//! embedding application installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Register metric descriptions
pub fn init_metrics() {
    // Document sync
    describe_counter!("sync.changes.local", "Number of local document changes");
    describe_counter!("sync.changes.remote", "Number of remote changes merged into a document");
    describe_counter!("sync.messages.rejected", "Inbound messages dropped by signature or ACL checks");
    describe_counter!("sync.messages.deferred", "Inbound messages waiting for an unknown key");
    describe_histogram!("sync.merge.duration_ms", "Remote change merge duration in milliseconds");

    // Keychain
    describe_counter!("keychain.keys.added", "Number of keys generated locally");
    describe_counter!("keychain.cache.miss", "Key lookups that required deserialization");

    // ACL
    describe_counter!("acl.merge", "Number of ACL deltas merged");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    /// Start a timer for the named histogram
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration in milliseconds
    pub fn stop(self) {
        record_histogram(self.name, self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
