//! Peer identities
//!
//! An identity is an Ed25519 verifying key. It is always addressed through
//! its canonical form (base58 of the 32 public key bytes), so two handles to
//! the same key compare, hash and serialize identically.

use crate::errors::{SyncError, SyncResult};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use zeroize::Zeroizing;

/// Public identity of a peer
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    key: VerifyingKey,
}

impl Identity {
    /// Wrap a verifying key
    pub fn from_verifying_key(key: VerifyingKey) -> Self {
        Identity { key }
    }

    /// Parse raw 32-byte public key
    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SyncError::KeyFormat(format!("expected 32 public key bytes, got {}", bytes.len())))?;
        VerifyingKey::from_bytes(&bytes)
            .map(Identity::from_verifying_key)
            .map_err(|e| SyncError::KeyFormat(format!("invalid public key: {}", e)))
    }

    /// Parse the canonical base58 form
    pub fn from_canonical(canonical: &str) -> SyncResult<Self> {
        let bytes = bs58::decode(canonical)
            .into_vec()
            .map_err(|e| SyncError::KeyFormat(format!("invalid identity encoding: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Canonical base58 form
    pub fn canonical(&self) -> String {
        bs58::encode(self.key.as_bytes()).into_string()
    }

    /// Raw public key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.key.as_bytes()
    }

    /// Verify a signature made by this identity
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> SyncResult<()> {
        let signature = Signature::from_slice(signature)
            .map_err(|e| SyncError::Crypto(format!("malformed signature: {}", e)))?;
        self.key
            .verify(message, &signature)
            .map_err(|_| SyncError::Crypto("signature verification failed".to_string()))
    }
}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.as_bytes().hash(state);
    }
}

impl TryFrom<String> for Identity {
    type Error = SyncError;

    fn try_from(canonical: String) -> Result<Self, Self::Error> {
        Identity::from_canonical(&canonical)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.canonical()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.canonical())
    }
}

/// Local signing identity
///
/// The secret key is zeroized on drop by ed25519-dalek.
#[derive(Clone)]
pub struct IdentityKeypair {
    signing: SigningKey,
}

impl IdentityKeypair {
    /// Generate a new keypair from the OS RNG
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut seed[..]);
        IdentityKeypair { signing: SigningKey::from_bytes(&seed) }
    }

    /// Restore a keypair from its 32-byte secret seed
    pub fn from_seed(seed: &[u8]) -> SyncResult<Self> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| SyncError::KeyFormat(format!("expected 32 seed bytes, got {}", seed.len())))?;
        Ok(IdentityKeypair { signing: SigningKey::from_bytes(&seed) })
    }

    /// Public identity
    pub fn identity(&self) -> Identity {
        Identity::from_verifying_key(self.signing.verifying_key())
    }

    /// Sign a message, returning the 64-byte signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for IdentityKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeypair").field("identity", &self.identity()).finish()
    }
}
