//! JSON encoding of messages for text-friendly transports

use crate::errors::{SyncError, SyncResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes sync messages and envelopes as JSON bytes
///
/// Binary fields travel as base64 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageSerializer;

impl JsonMessageSerializer {
    pub fn encode<T: Serialize>(&self, message: &T) -> SyncResult<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    /// Malformed input fails with `SyncError::Decode`
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> SyncResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
