/*
    cipher.rs - Encryption of change payloads in transit

    Seals payloads with AES-256-GCM under a keychain key.

    Security properties:
    - Authenticated encryption (AEAD)
    - Random 96-bit nonce per seal
    - The key id is bound as associated data, so a payload cannot be
      relabelled to claim a different key
*/

use super::key::{KeyId, SymmetricKey};
use crate::encoding::base64_bytes;
use crate::errors::{SyncError, SyncResult};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use serde::{Deserialize, Serialize};

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// A payload encrypted under a keychain key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedChanges {
    /// Key the payload was sealed under
    pub key_id: KeyId,
    /// Random nonce
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// Ciphertext including the GCM tag
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

/// Seals and opens change payloads
pub struct ChangeCipher;

impl ChangeCipher {
    /// Encrypt `plaintext` under `key`
    pub fn seal(key_id: KeyId, key: &SymmetricKey, plaintext: &[u8]) -> SyncResult<SealedChanges> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, Payload { msg: plaintext, aad: key_id.as_bytes() })
            .map_err(|e| SyncError::Crypto(format!("encryption failed: {}", e)))?;

        Ok(SealedChanges { key_id, nonce: nonce_bytes.to_vec(), ciphertext })
    }

    /// Decrypt a sealed payload with the key it names
    pub fn open(key: &SymmetricKey, sealed: &SealedChanges) -> SyncResult<Vec<u8>> {
        if sealed.nonce.len() != NONCE_LEN {
            return Err(SyncError::Crypto(format!("invalid nonce length {}", sealed.nonce.len())));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        let nonce = Nonce::from_slice(&sealed.nonce);

        cipher
            .decrypt(nonce, Payload { msg: &sealed.ciphertext, aad: sealed.key_id.as_bytes() })
            .map_err(|e| SyncError::Crypto(format!("decryption failed: {}", e)))
    }
}
