//! Change notifications
//!
//! Every successful change to a swarm document is broadcast to subscribers
//! over a tokio broadcast channel. Slow subscribers lag and lose the oldest
//! events; the document itself never blocks on them.

use crate::core_acl::Identity;
use tokio::sync::broadcast;

/// Where a change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Local,
    Remote(Identity),
}

/// Emitted after a change has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    pub document_id: String,
    pub origin: ChangeOrigin,
    pub description: Option<String>,
}

/// Fan-out of document events
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<DocumentEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event, returning how many subscribers it reached
    pub fn emit(&self, event: DocumentEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
