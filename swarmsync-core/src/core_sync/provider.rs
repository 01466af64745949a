/*
    provider.rs - Document provider contract

    A provider is the seam between the sync layer and a concrete CRDT
    engine. Documents are mutated only through an exclusive borrow, and every
    mutation yields a changes blob that peers merge with remote_change().

    Contract:
    - remote_change is idempotent and commutative
    - get_history rebuilds the full document from an empty one
    - malformed changes fail with SyncError::Decode and leave the document
      untouched
*/

use super::message::SyncMessage;
use crate::errors::SyncResult;

/// A pluggable CRDT document engine
pub trait CrdtProvider: Send + Sync {
    /// Opaque document state
    type Document: Send + Sync;

    /// Serializable document delta
    type Changes: Clone + Send + Sync;

    /// Mutation applied by `local_change`
    type ChangeFn;

    /// Envelope carrying `Changes` to peers
    type Message: SyncMessage<Changes = Self::Changes>;

    /// Fresh, empty document
    fn new_document(&self) -> Self::Document;

    /// Empty message tagged with `document_id`
    ///
    /// Fails with `InvalidDocumentId` when the id is malformed.
    fn new_message(&self, document_id: &str) -> SyncResult<Self::Message>;

    /// Apply a local edit and return the changes it produced
    fn local_change(
        &self,
        document: &mut Self::Document,
        description: &str,
        change: Self::ChangeFn,
    ) -> SyncResult<Self::Changes>;

    /// Merge changes received from a peer
    fn remote_change(&self, document: &mut Self::Document, changes: &Self::Changes) -> SyncResult<()>;

    /// Changes sufficient to rebuild `document` from empty
    fn get_history(&self, document: &Self::Document) -> SyncResult<Self::Changes>;
}
