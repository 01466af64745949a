/*
    Swarm subsystem - documents shared by a group of peers

    Composes a document provider, an ACL and a keychain into the
    change/receive protocol, with signed envelopes on the wire and change
    notifications for the application.
*/

pub mod document;
pub mod envelope;
pub mod events;

pub use document::{MapSwarmDocument, ReceiveOutcome, SwarmDocument};
pub use envelope::SignedEnvelope;
pub use events::{ChangeOrigin, DocumentEvent, EventBroadcaster};
