/*
    keychain.rs - Replicated history of symmetric keys

    The keychain is an append-only log of (key id, serialized key) records,
    replicated like any other CRDT. Peers that have merged the same deltas
    agree on the order of the log and therefore on the current key.

    Flow for add():
    1. Generate key material and a fresh 128-bit key id
    2. Serialize the key (may await)
    3. Under the state lock: build the delta, encode it, merge it locally
    4. Cache the materialized key

    Steps 1-2 touch no shared state, so dropping the future there leaves the
    keychain untouched. Step 3-4 run without any await point.

    merge() accepts a remote log only if every record it does not already
    hold by stamp carries a key id the keychain has never seen and a key
    that deserializes. Records it already holds must match byte for byte.
*/

use super::cache::{KeyCache, DEFAULT_KEY_CACHE_CAPACITY};
use super::key::{KeyId, SymmetricKey, KEY_ID_LEN};
use super::serializer::{JwkKeySerializer, KeySerializer};
use crate::core_crdt::{AppendLog, Crdt, LamportClock, Stamp};
use crate::core_sync::codec::{self, BlobKind};
use crate::errors::{handle_poison, SyncError, SyncResult};
use crate::metrics::record_counter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info};

/// A key as stored in the replicated log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Globally unique key id
    pub key_id: KeyId,
    /// Transportable form produced by a KeySerializer
    pub serialized: String,
}

/// A mergeable history of encryption keys
#[async_trait]
pub trait Keychain: Send + Sync {
    /// Generate a new key and append it, returning (id, key, delta)
    async fn add(&self) -> SyncResult<(KeyId, SymmetricKey, Vec<u8>)>;

    /// Full log snapshot for bootstrapping peers
    fn history(&self) -> SyncResult<Vec<u8>>;

    /// Merge a remote delta; nothing changes unless the whole delta is valid
    async fn merge(&self, delta: &[u8]) -> SyncResult<()>;

    /// All keys in merged order
    async fn keys(&self) -> SyncResult<Vec<(KeyId, SymmetricKey)>>;

    /// Last key in merged order
    async fn current(&self) -> SyncResult<(KeyId, SymmetricKey)>;

    /// Cache-only lookup; never deserializes
    fn get_key(&self, key_id: &KeyId) -> SyncResult<Option<SymmetricKey>>;
}

/// Builds keychains
pub trait KeychainProvider: Send + Sync {
    type Keychain: Keychain;

    /// Create an empty keychain
    fn initialize(&self) -> Self::Keychain;

    /// Width of key ids in bytes
    fn key_id_length(&self) -> usize;
}

struct KeychainState {
    log: AppendLog<KeyRecord>,
    clock: LamportClock,
}

/// Keychain backed by an append-only log CRDT
pub struct LogKeychain<S: KeySerializer = JwkKeySerializer> {
    state: RwLock<KeychainState>,
    cache: KeyCache,
    serializer: S,
}

impl LogKeychain<JwkKeySerializer> {
    /// Create an empty keychain with JWK serialization
    pub fn new(cache_capacity: usize) -> Self {
        Self::with_serializer(JwkKeySerializer, cache_capacity)
    }
}

impl Default for LogKeychain<JwkKeySerializer> {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_CACHE_CAPACITY)
    }
}

impl<S: KeySerializer> LogKeychain<S> {
    /// Create an empty keychain with a custom serializer
    pub fn with_serializer(serializer: S, cache_capacity: usize) -> Self {
        LogKeychain {
            state: RwLock::new(KeychainState {
                log: AppendLog::new(),
                clock: LamportClock::random(),
            }),
            cache: KeyCache::new(cache_capacity),
            serializer,
        }
    }

    /// The key cache
    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Number of keys in the log
    pub fn len(&self) -> SyncResult<usize> {
        Ok(self.state.read().map_err(handle_poison)?.log.len())
    }

    /// Whether no key has been added or merged yet
    pub fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Resolve a key through the cache, deserializing on a miss
    async fn materialize(&self, record: &KeyRecord) -> SyncResult<SymmetricKey> {
        if let Some(key) = self.cache.get(&record.key_id)? {
            return Ok(key);
        }

        record_counter("keychain.cache.miss", 1);
        let key = self.serializer.deserialize(&record.serialized).await?;
        self.cache.insert(record.key_id, key.clone())?;
        Ok(key)
    }

    /// Records in `remote` that are not yet in `log`, rejecting conflicts
    fn fresh_records(log: &AppendLog<KeyRecord>, remote: &AppendLog<KeyRecord>) -> SyncResult<Vec<KeyRecord>> {
        let known: HashMap<KeyId, &Stamp> = log.iter().map(|element| (element.value.key_id, &element.id)).collect();
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();

        for element in remote.iter() {
            if let Some(existing) = log.get(&element.id) {
                if existing != element {
                    return Err(SyncError::Decode(format!(
                        "keychain element {} differs from the stored record",
                        element.id
                    )));
                }
                continue;
            }

            let key_id = element.value.key_id;
            if let Some(stamp) = known.get(&key_id) {
                return Err(SyncError::Decode(format!("key id {} already stored under {}", key_id, stamp)));
            }
            if !seen.insert(key_id) {
                return Err(SyncError::Decode(format!("key id {} appears twice in delta", key_id)));
            }
            fresh.push(element.value.clone());
        }
        Ok(fresh)
    }

    fn records_in_order(&self) -> SyncResult<Vec<KeyRecord>> {
        let state = self.state.read().map_err(handle_poison)?;
        Ok(state.log.ordered().into_iter().map(|element| element.value.clone()).collect())
    }
}

#[async_trait]
impl<S: KeySerializer> Keychain for LogKeychain<S> {
    async fn add(&self) -> SyncResult<(KeyId, SymmetricKey, Vec<u8>)> {
        let key = SymmetricKey::generate()?;
        let key_id = KeyId::generate();
        let serialized = self.serializer.serialize(&key).await?;

        let delta = {
            let mut state = self.state.write().map_err(handle_poison)?;
            if state.log.iter().any(|element| element.value.key_id == key_id) {
                return Err(SyncError::Internal(format!("key id collision: {}", key_id)));
            }

            let stamp = state.clock.tick()?;
            let delta = state.log.prepare_append(stamp, KeyRecord { key_id, serialized });
            let bytes = codec::encode(BlobKind::Keychain, &delta)?;
            state.log.merge(&delta)?;
            bytes
        };
        self.cache.insert(key_id, key.clone())?;

        record_counter("keychain.keys.added", 1);
        info!(key_id = %key_id, fingerprint = %key.fingerprint(), "Added key to keychain");
        Ok((key_id, key, delta))
    }

    fn history(&self) -> SyncResult<Vec<u8>> {
        let state = self.state.read().map_err(handle_poison)?;
        codec::encode(BlobKind::Keychain, &state.log)
    }

    async fn merge(&self, delta: &[u8]) -> SyncResult<()> {
        let remote: AppendLog<KeyRecord> = codec::decode(BlobKind::Keychain, delta)?;
        LamportClock::check_remote(remote.max_counter())?;
        remote.check_links()?;

        // Validate every new record before touching state
        let fresh = {
            let state = self.state.read().map_err(handle_poison)?;
            Self::fresh_records(&state.log, &remote)?
        };
        let mut materialized = Vec::with_capacity(fresh.len());
        for record in &fresh {
            let key = self.serializer.deserialize(&record.serialized).await?;
            materialized.push((record.key_id, key));
        }

        {
            let mut state = self.state.write().map_err(handle_poison)?;
            // A concurrent merge may have landed since the read above
            Self::fresh_records(&state.log, &remote)?;
            state.log.merge(&remote)?;
            state.clock.observe(remote.max_counter());
        }

        let added = materialized.len();
        self.cache.insert_many(materialized)?;
        debug!(new_keys = added, "Merged keychain delta");
        Ok(())
    }

    async fn keys(&self) -> SyncResult<Vec<(KeyId, SymmetricKey)>> {
        let records = self.records_in_order()?;
        let mut keys = Vec::with_capacity(records.len());
        for record in &records {
            keys.push((record.key_id, self.materialize(record).await?));
        }
        Ok(keys)
    }

    async fn current(&self) -> SyncResult<(KeyId, SymmetricKey)> {
        let record = {
            let state = self.state.read().map_err(handle_poison)?;
            state.log.last().map(|element| element.value.clone())
        };
        let record = record.ok_or(SyncError::EmptyKeychain)?;
        let key = self.materialize(&record).await?;
        Ok((record.key_id, key))
    }

    fn get_key(&self, key_id: &KeyId) -> SyncResult<Option<SymmetricKey>> {
        self.cache.get(key_id)
    }
}

/// Provider for log-backed keychains
#[derive(Debug, Clone)]
pub struct LogKeychainProvider {
    cache_capacity: usize,
}

impl LogKeychainProvider {
    pub fn new(cache_capacity: usize) -> Self {
        LogKeychainProvider { cache_capacity }
    }
}

impl Default for LogKeychainProvider {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_CACHE_CAPACITY)
    }
}

impl KeychainProvider for LogKeychainProvider {
    type Keychain = LogKeychain<JwkKeySerializer>;

    fn initialize(&self) -> Self::Keychain {
        LogKeychain::new(self.cache_capacity)
    }

    fn key_id_length(&self) -> usize {
        KEY_ID_LEN
    }
}
