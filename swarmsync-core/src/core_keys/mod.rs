/*
    Keys subsystem - symmetric keys for change encryption

    - key:        key ids and AES-256-GCM key material
    - serializer: transportable key forms (JWK, raw base64)
    - cache:      bounded LRU of materialized keys
    - keychain:   replicated append-only key history
    - cipher:     sealing change blobs under a keychain key
*/

pub mod cache;
pub mod cipher;
pub mod key;
pub mod keychain;
pub mod serializer;

pub use cache::{KeyCache, DEFAULT_KEY_CACHE_CAPACITY};
pub use cipher::{ChangeCipher, SealedChanges};
pub use key::{KeyId, SymmetricKey, KEY_ID_LEN, KEY_LEN};
pub use keychain::{KeyRecord, Keychain, KeychainProvider, LogKeychain, LogKeychainProvider};
pub use serializer::{JwkKeySerializer, KeySerializer, RawKeySerializer};
