/*
    document.rs - A document shared by a swarm of peers

    Ties a document provider to an ACL and a keychain:

    change():  local edit -> seal under the current key -> sign
    receive(): verify signature -> check sender against the ACL ->
               resolve key -> open -> merge

    Rejected and deferred messages are outcomes, not errors: a peer that is
    not (yet) authorized, or a key that has not arrived yet, is part of
    normal operation. Malformed or undecryptable payloads are errors and
    never touch the document.
*/

use super::envelope::SignedEnvelope;
use super::events::{ChangeOrigin, DocumentEvent, EventBroadcaster};
use crate::config::SyncConfig;
use crate::core_acl::{Acl, AclProvider, Identity, IdentityKeypair, OrSetAcl, OrSetAclProvider};
use crate::core_keys::{ChangeCipher, KeyId, Keychain, KeychainProvider, LogKeychain, LogKeychainProvider, SymmetricKey};
use crate::core_sync::{CrdtProvider, MapProvider, SyncMessage};
use crate::errors::{handle_poison, SyncError, SyncResult};
use crate::metrics::{record_counter, Timer};
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Result of handing an inbound envelope to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Changes were merged
    Applied,
    /// Bad signature or sender not in the ACL; nothing was merged
    Rejected { sender: Identity },
    /// Sealed under a key this peer has not seen; retry after a keychain merge
    Deferred { key_id: KeyId },
}

/// A document replicated across a swarm of peers
pub struct SwarmDocument<P: CrdtProvider, A: Acl, K: Keychain> {
    document_id: String,
    provider: P,
    document: RwLock<P::Document>,
    acl: A,
    keychain: K,
    author: IdentityKeypair,
    events: EventBroadcaster,
}

/// Swarm document over the built-in engines
pub type MapSwarmDocument = SwarmDocument<MapProvider, OrSetAcl, LogKeychain>;

impl<P, A, K> SwarmDocument<P, A, K>
where
    P: CrdtProvider<Changes = Vec<u8>>,
    A: Acl,
    K: Keychain,
{
    /// Assemble a document from its parts
    ///
    /// Fails with `InvalidDocumentId` if the provider rejects the id.
    pub fn new(
        document_id: impl Into<String>,
        provider: P,
        acl: A,
        keychain: K,
        author: IdentityKeypair,
        event_capacity: usize,
    ) -> SyncResult<Self> {
        let document_id = document_id.into();
        provider.new_message(&document_id)?;
        let document = RwLock::new(provider.new_document());

        Ok(SwarmDocument {
            document_id,
            provider,
            document,
            acl,
            keychain,
            author,
            events: EventBroadcaster::new(event_capacity),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Identity this peer signs with
    pub fn identity(&self) -> Identity {
        self.author.identity()
    }

    pub fn acl(&self) -> &A {
        &self.acl
    }

    pub fn keychain(&self) -> &K {
        &self.keychain
    }

    /// Authorize this peer and provision the first key
    ///
    /// Used by the peer that creates a document. Returns the ACL and keychain
    /// deltas to hand to the other peers.
    pub async fn bootstrap(&self) -> SyncResult<(Vec<u8>, Vec<u8>)> {
        let acl_delta = self.acl.add(&self.identity())?;
        let (key_id, _, key_delta) = self.keychain.add().await?;
        info!(document_id = %self.document_id, key_id = %key_id, "Bootstrapped swarm document");
        Ok((acl_delta, key_delta))
    }

    /// Apply a local change and produce the envelope to broadcast
    ///
    /// Fails with `Unauthorized` if this peer is not in the ACL and with
    /// `EmptyKeychain` before any key exists. Both checks run before the
    /// document is touched.
    pub async fn change(&self, description: &str, change: P::ChangeFn) -> SyncResult<SignedEnvelope> {
        let identity = self.identity();
        if !self.acl.check(&identity)? {
            return Err(SyncError::Unauthorized(format!("{} is not in the ACL", identity)));
        }
        let (key_id, key) = self.keychain.current().await?;

        let changes = {
            let mut document = self.document.write().map_err(handle_poison)?;
            self.provider.local_change(&mut document, description, change)?
        };

        let envelope = self.seal(changes, Some(description), key_id, &key)?;

        record_counter("sync.changes.local", 1);
        debug!(document_id = %self.document_id, description, key_id = %key_id, "Local change");
        self.events.emit(DocumentEvent {
            document_id: self.document_id.clone(),
            origin: ChangeOrigin::Local,
            description: Some(description.to_string()),
        });
        Ok(envelope)
    }

    /// Full document state sealed for a late-joining peer
    pub async fn history_envelope(&self) -> SyncResult<SignedEnvelope> {
        let (key_id, key) = self.keychain.current().await?;
        let history = {
            let document = self.document.read().map_err(handle_poison)?;
            self.provider.get_history(&document)?
        };
        self.seal(history, None, key_id, &key)
    }

    fn seal(
        &self,
        changes: Vec<u8>,
        description: Option<&str>,
        key_id: KeyId,
        key: &SymmetricKey,
    ) -> SyncResult<SignedEnvelope> {
        let mut message = self.provider.new_message(&self.document_id)?;
        message.set_changes(changes);
        if let Some(description) = description {
            message.set_description(description);
        }

        let sealed = ChangeCipher::seal(key_id, key, message.changes())?;
        Ok(SignedEnvelope::sign(
            &self.author,
            message.document_id(),
            description.map(str::to_string),
            sealed,
        ))
    }

    /// Handle an envelope from a peer
    pub async fn receive(&self, envelope: &SignedEnvelope) -> SyncResult<ReceiveOutcome> {
        if envelope.document_id != self.document_id {
            return Err(SyncError::InvalidDocumentId(format!(
                "envelope for {:?} delivered to {:?}",
                envelope.document_id, self.document_id
            )));
        }

        let sender = envelope.sender;
        if let Err(e) = envelope.verify() {
            warn!(document_id = %self.document_id, sender = %sender, error = %e, "Dropping envelope with bad signature");
            record_counter("sync.messages.rejected", 1);
            return Ok(ReceiveOutcome::Rejected { sender });
        }

        if !self.acl.check(&sender)? {
            warn!(document_id = %self.document_id, sender = %sender, "Dropping change from sender not in ACL");
            record_counter("sync.messages.rejected", 1);
            return Ok(ReceiveOutcome::Rejected { sender });
        }

        let key_id = envelope.sealed.key_id;
        let key = match self.resolve_key(&key_id).await? {
            Some(key) => key,
            None => {
                debug!(document_id = %self.document_id, key_id = %key_id, "Deferring change sealed under unknown key");
                record_counter("sync.messages.deferred", 1);
                return Ok(ReceiveOutcome::Deferred { key_id });
            }
        };

        let changes = ChangeCipher::open(&key, &envelope.sealed)?;

        let timer = Timer::new("sync.merge.duration_ms");
        {
            let mut document = self.document.write().map_err(handle_poison)?;
            self.provider.remote_change(&mut document, &changes)?;
        }
        timer.stop();

        record_counter("sync.changes.remote", 1);
        debug!(document_id = %self.document_id, sender = %sender, "Merged remote change");
        self.events.emit(DocumentEvent {
            document_id: self.document_id.clone(),
            origin: ChangeOrigin::Remote(sender),
            description: envelope.description.clone(),
        });
        Ok(ReceiveOutcome::Applied)
    }

    /// Cache hit on the hot path, full keychain walk otherwise
    async fn resolve_key(&self, key_id: &KeyId) -> SyncResult<Option<SymmetricKey>> {
        if let Some(key) = self.keychain.get_key(key_id)? {
            return Ok(Some(key));
        }
        Ok(self
            .keychain
            .keys()
            .await?
            .into_iter()
            .find(|(id, _)| id == key_id)
            .map(|(_, key)| key))
    }

    /// Read the document state
    pub fn read<R>(&self, f: impl FnOnce(&P::Document) -> R) -> SyncResult<R> {
        let document = self.document.read().map_err(handle_poison)?;
        Ok(f(&document))
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }
}

impl MapSwarmDocument {
    /// Open an empty document with the built-in engines
    pub fn open(
        document_id: impl Into<String>,
        author: IdentityKeypair,
        config: &SyncConfig,
    ) -> SyncResult<Self> {
        Self::new(
            document_id,
            MapProvider::new(config.document.max_document_id_len),
            OrSetAclProvider::new(config.acl.identity_cache_capacity).initialize(),
            LogKeychainProvider::new(config.keychain.key_cache_capacity).initialize(),
            author,
            config.document.event_capacity,
        )
    }
}
