//! Sync message envelopes
//!
//! A sync message tags a changes blob with the document it belongs to.
//! Providers add their own metadata on top.

use crate::errors::{SyncError, SyncResult};

/// Default upper bound on document id length
pub const DEFAULT_MAX_DOCUMENT_ID_LEN: usize = 256;

/// Payload exchanged between peers
pub trait SyncMessage: Clone + Send + Sync {
    type Changes;

    /// Document the changes belong to
    fn document_id(&self) -> &str;

    fn changes(&self) -> &Self::Changes;

    fn set_changes(&mut self, changes: Self::Changes);

    /// Attach the advisory change description, if the message carries one
    fn set_description(&mut self, _description: &str) {}
}

/// Check that a document id is non-empty, bounded, and uses only
/// `[A-Za-z0-9-_./:]`
pub fn validate_document_id(document_id: &str, max_len: usize) -> SyncResult<()> {
    if document_id.is_empty() {
        return Err(SyncError::InvalidDocumentId("document id is empty".to_string()));
    }

    if document_id.len() > max_len {
        return Err(SyncError::InvalidDocumentId(format!(
            "document id is {} bytes, limit is {}",
            document_id.len(),
            max_len
        )));
    }

    if let Some(bad) = document_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':')))
    {
        return Err(SyncError::InvalidDocumentId(format!(
            "unexpected character {:?} in {:?}",
            bad, document_id
        )));
    }

    Ok(())
}
