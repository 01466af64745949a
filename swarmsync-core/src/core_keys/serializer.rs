//! Key serialization
//!
//! Converts key handles to and from a transportable text form. The trait is
//! async so implementations backed by an HSM or platform keystore can await
//! without blocking the runtime.

use super::key::{SymmetricKey, KEY_LEN};
use crate::errors::{SyncError, SyncResult};
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Converts symmetric keys to and from a transportable form
#[async_trait]
pub trait KeySerializer: Send + Sync {
    /// Export a key
    async fn serialize(&self, key: &SymmetricKey) -> SyncResult<String>;

    /// Import a key; malformed input fails with `SyncError::KeyFormat`
    async fn deserialize(&self, serialized: &str) -> SyncResult<SymmetricKey>;
}

/// JSON Web Key (RFC 7517) for an octet-sequence key
#[derive(Debug, Serialize, Deserialize)]
struct Jwk {
    kty: String,
    k: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(default)]
    ext: bool,
    #[serde(default)]
    key_ops: Vec<String>,
}

const JWK_KTY: &str = "oct";
const JWK_ALG: &str = "A256GCM";

/// Serializes keys as JWK JSON, the format web crypto exports AES keys in
#[derive(Debug, Clone, Copy, Default)]
pub struct JwkKeySerializer;

#[async_trait]
impl KeySerializer for JwkKeySerializer {
    async fn serialize(&self, key: &SymmetricKey) -> SyncResult<String> {
        let jwk = Jwk {
            kty: JWK_KTY.to_string(),
            k: URL_SAFE_NO_PAD.encode(key.as_bytes()),
            alg: Some(JWK_ALG.to_string()),
            ext: true,
            key_ops: vec!["encrypt".to_string(), "decrypt".to_string()],
        };
        serde_json::to_string(&jwk).map_err(|e| SyncError::Serialization(e.to_string()))
    }

    async fn deserialize(&self, serialized: &str) -> SyncResult<SymmetricKey> {
        let jwk: Jwk = serde_json::from_str(serialized)
            .map_err(|e| SyncError::KeyFormat(format!("invalid JWK: {}", e)))?;

        if jwk.kty != JWK_KTY {
            return Err(SyncError::KeyFormat(format!("unsupported key type {:?}", jwk.kty)));
        }
        if let Some(alg) = &jwk.alg {
            if alg != JWK_ALG {
                return Err(SyncError::KeyFormat(format!("unsupported algorithm {:?}", alg)));
            }
        }

        let bytes = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(jwk.k.as_bytes())
                .map_err(|e| SyncError::KeyFormat(format!("invalid key material: {}", e)))?,
        );
        SymmetricKey::from_bytes(&bytes)
    }
}

/// Serializes keys as standard base64 of the raw key bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawKeySerializer;

#[async_trait]
impl KeySerializer for RawKeySerializer {
    async fn serialize(&self, key: &SymmetricKey) -> SyncResult<String> {
        Ok(STANDARD.encode(key.as_bytes()))
    }

    async fn deserialize(&self, serialized: &str) -> SyncResult<SymmetricKey> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(serialized.trim())
                .map_err(|e| SyncError::KeyFormat(format!("invalid base64 key: {}", e)))?,
        );
        if bytes.len() != KEY_LEN {
            return Err(SyncError::KeyFormat(format!("expected {} key bytes, got {}", KEY_LEN, bytes.len())));
        }
        SymmetricKey::from_bytes(&bytes)
    }
}
