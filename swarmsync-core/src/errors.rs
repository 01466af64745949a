/*
    errors.rs - Error types for the sync layer

    Defines the errors that can occur in:
    - Decoding change blobs from remote peers
    - Key serialization and key lifecycle
    - Access-control checks
    - Change encryption
*/

use std::sync::PoisonError;
use thiserror::Error;

/// Errors that can occur while syncing documents, ACLs and keychains
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed changes blob (bad version, truncated or garbage input)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed key serialization
    #[error("Key format error: {0}")]
    KeyFormat(String),

    /// No key has been added to the keychain yet
    #[error("Keychain is empty")]
    EmptyKeychain,

    /// Sender is not present in the ACL
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Document id failed structural validation
    #[error("Invalid document id: {0}")]
    InvalidDocumentId(String),

    /// Key generation, encryption, decryption or signature failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization of an outgoing value failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (poisoned lock, broken invariant)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Whether the caller may retry the operation later
    ///
    /// Only an empty keychain is transient: the key arrives with the next
    /// keychain merge.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::EmptyKeychain)
    }
}

impl From<bincode::Error> for SyncError {
    fn from(err: bincode::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

/// Helper to convert poison errors into SyncError
pub(crate) fn handle_poison<T>(_err: PoisonError<T>) -> SyncError {
    SyncError::Internal("Lock poisoned: a thread panicked while holding the lock".to_string())
}
