//! Key identifiers and symmetric key material
//!
//! Keys are AES-256-GCM keys. Secret bytes are zeroized on drop, so a key
//! evicted from the cache or dropped by a caller does not linger in memory.

use crate::errors::{SyncError, SyncResult};
use aes_gcm::aead::{KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of an AES-256 key in bytes
pub const KEY_LEN: usize = 32;

/// Length of a key id in bytes
pub const KEY_ID_LEN: usize = 16;

/// 128-bit random key identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(Uuid);

impl KeyId {
    /// Generate a fresh random key id
    pub fn generate() -> Self {
        KeyId(Uuid::new_v4())
    }

    /// Raw 16-byte form
    pub fn as_bytes(&self) -> &[u8; KEY_ID_LEN] {
        self.0.as_bytes()
    }

    /// Parse from the raw 16-byte form
    pub fn from_slice(bytes: &[u8]) -> SyncResult<Self> {
        Uuid::from_slice(bytes)
            .map(KeyId)
            .map_err(|e| SyncError::KeyFormat(format!("invalid key id: {}", e)))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// AES-256-GCM key material
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_LEN],
}

impl SymmetricKey {
    /// Generate a new random key from the OS RNG
    pub fn generate() -> SyncResult<Self> {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self::from_bytes(key.as_slice())
    }

    /// Build a key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            SyncError::KeyFormat(format!("expected {} key bytes, got {}", KEY_LEN, bytes.len()))
        })?;
        Ok(SymmetricKey { bytes })
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Short non-secret fingerprint for logs
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.bytes);
        hex::encode(&hash.as_bytes()[..6])
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey").field("fingerprint", &self.fingerprint()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_bytes_roundtrip() {
        let id = KeyId::generate();
        assert_eq!(id.as_bytes().len(), KEY_ID_LEN);
        assert_eq!(KeyId::from_slice(id.as_bytes()).unwrap(), id);
    }

    #[test]
    fn test_key_id_rejects_wrong_length() {
        assert!(matches!(KeyId::from_slice(&[0u8; 15]), Err(SyncError::KeyFormat(_))));
    }

    #[test]
    fn test_key_ids_unique() {
        let ids: std::collections::HashSet<KeyId> = (0..1000).map(|_| KeyId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_generated_keys_differ() {
        let k1 = SymmetricKey::generate().unwrap();
        let k2 = SymmetricKey::generate().unwrap();
        assert_ne!(k1, k2);
        assert_eq!(k1.as_bytes().len(), KEY_LEN);
    }

    #[test]
    fn test_from_bytes_validates_length() {
        assert!(SymmetricKey::from_bytes(&[7u8; KEY_LEN]).is_ok());
        assert!(matches!(SymmetricKey::from_bytes(&[7u8; 16]), Err(SyncError::KeyFormat(_))));
    }

    #[test]
    fn test_debug_does_not_leak_material() {
        let key = SymmetricKey::from_bytes(&[0xAB; KEY_LEN]).unwrap();
        let debug = format!("{:?}", key);
        assert!(!debug.contains("bytes"));
        assert!(debug.contains("fingerprint"));
    }
}
