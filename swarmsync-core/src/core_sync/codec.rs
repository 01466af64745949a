/*
    codec.rs - Versioned binary encoding for change blobs

    Every blob produced by this crate (document deltas, ACL deltas,
    keychain deltas) shares the same frame:

    - byte 0: format version
    - byte 1: blob kind, so a keychain delta fed to an ACL is rejected
    - rest:   bincode body (varint integers, no trailing bytes)

    Decoding validates the whole frame before anything is merged.
*/

use crate::errors::{SyncError, SyncResult};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Version of the blob encoding format
pub const FORMAT_VERSION: u8 = 1;

/// Upper bound on a decoded body, guards against hostile length prefixes
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

const HEADER_LEN: usize = 2;

/// What a blob carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlobKind {
    Document = 1,
    Acl = 2,
    Keychain = 3,
}

impl BlobKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(BlobKind::Document),
            2 => Some(BlobKind::Acl),
            3 => Some(BlobKind::Keychain),
            _ => None,
        }
    }
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_BODY_BYTES)
}

/// Encode a value into a framed blob
pub fn encode<T: Serialize>(kind: BlobKind, value: &T) -> SyncResult<Vec<u8>> {
    let body = options()
        .serialize(value)
        .map_err(|e| SyncError::Serialization(e.to_string()))?;

    let mut blob = Vec::with_capacity(HEADER_LEN + body.len());
    blob.push(FORMAT_VERSION);
    blob.push(kind as u8);
    blob.extend_from_slice(&body);
    Ok(blob)
}

/// Decode a framed blob, checking version and kind
pub fn decode<T: DeserializeOwned>(kind: BlobKind, blob: &[u8]) -> SyncResult<T> {
    if blob.len() < HEADER_LEN {
        return Err(SyncError::Decode(format!("blob too short: {} bytes", blob.len())));
    }

    if blob[0] != FORMAT_VERSION {
        return Err(SyncError::Decode(format!("unsupported format version {}", blob[0])));
    }

    match BlobKind::from_byte(blob[1]) {
        Some(found) if found == kind => {}
        Some(found) => {
            return Err(SyncError::Decode(format!("expected {:?} blob, got {:?}", kind, found)));
        }
        None => return Err(SyncError::Decode(format!("unknown blob kind {}", blob[1]))),
    }

    Ok(options().deserialize(&blob[HEADER_LEN..])?)
}
