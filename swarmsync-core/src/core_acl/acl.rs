/*
    acl.rs - Replicated access-control list

    The ACL is the set of identities allowed to write a document. It is an
    add-wins observed-remove set keyed by canonical identity strings, so ACL
    edits from several authorizers converge like document edits:

    - add(x) || add(x)      -> x present
    - add(x) || remove(x)   -> x present (the remove only saw older adds)
    - remove(x) then add(x) -> x present (fresh add tag)

    Every mutation returns a delta blob; current() returns the full state.
*/

use super::identity::Identity;
use crate::core_crdt::{Crdt, LamportClock, ORSet};
use crate::core_sync::codec::{self, BlobKind};
use crate::errors::{handle_poison, SyncError, SyncResult};
use crate::metrics::record_counter;
use hashlink::LruCache;
use std::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Default number of parsed identities kept by users()
pub const DEFAULT_IDENTITY_CACHE_CAPACITY: usize = 256;

/// A mergeable set of authorized identities
pub trait Acl: Send + Sync {
    /// Authorize an identity, returning the delta to propagate
    fn add(&self, identity: &Identity) -> SyncResult<Vec<u8>>;

    /// Revoke an identity; yields an empty delta if it was not present
    fn remove(&self, identity: &Identity) -> SyncResult<Vec<u8>>;

    /// Membership test against the locally merged state
    fn check(&self, identity: &Identity) -> SyncResult<bool>;

    /// Full-state snapshot for bootstrapping peers
    fn current(&self) -> SyncResult<Vec<u8>>;

    /// Merge a remote delta or snapshot
    fn merge(&self, delta: &[u8]) -> SyncResult<()>;

    /// Currently authorized identities
    fn users(&self) -> SyncResult<Vec<Identity>>;
}

/// Builds ACLs
pub trait AclProvider: Send + Sync {
    type Acl: Acl;

    /// Create an empty, active ACL
    fn initialize(&self) -> Self::Acl;
}

struct AclState {
    users: ORSet<String>,
    clock: LamportClock,
}

/// ACL backed by an add-wins OR-Set
pub struct OrSetAcl {
    state: RwLock<AclState>,
    identities: Mutex<LruCache<String, Identity>>,
}

impl OrSetAcl {
    /// Create an empty ACL
    pub fn new(identity_cache_capacity: usize) -> Self {
        OrSetAcl {
            state: RwLock::new(AclState { users: ORSet::new(), clock: LamportClock::random() }),
            identities: Mutex::new(LruCache::new(identity_cache_capacity.max(1))),
        }
    }

    /// Number of authorized identities
    pub fn len(&self) -> SyncResult<usize> {
        Ok(self.state.read().map_err(handle_poison)?.users.len())
    }

    /// Whether nobody is authorized
    pub fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len()? == 0)
    }

    fn resolve(&self, canonical: &str) -> SyncResult<Identity> {
        let mut identities = self.identities.lock().map_err(handle_poison)?;
        if let Some(identity) = identities.get(canonical) {
            return Ok(*identity);
        }
        let identity = Identity::from_canonical(canonical)?;
        identities.insert(canonical.to_string(), identity);
        Ok(identity)
    }
}

impl Default for OrSetAcl {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CACHE_CAPACITY)
    }
}

impl Acl for OrSetAcl {
    fn add(&self, identity: &Identity) -> SyncResult<Vec<u8>> {
        let canonical = identity.canonical();
        let mut state = self.state.write().map_err(handle_poison)?;

        let tag = state.clock.tick()?;
        let delta = state.users.add(canonical, tag);
        let blob = codec::encode(BlobKind::Acl, &delta)?;

        info!(identity = %identity, "Added identity to ACL");
        Ok(blob)
    }

    fn remove(&self, identity: &Identity) -> SyncResult<Vec<u8>> {
        let canonical = identity.canonical();
        let mut state = self.state.write().map_err(handle_poison)?;

        let delta = state.users.remove(&canonical);
        if delta.is_noop() {
            debug!(identity = %identity, "Remove of identity not in ACL");
        } else {
            info!(identity = %identity, "Removed identity from ACL");
        }
        codec::encode(BlobKind::Acl, &delta)
    }

    fn check(&self, identity: &Identity) -> SyncResult<bool> {
        let state = self.state.read().map_err(handle_poison)?;
        Ok(state.users.contains(&identity.canonical()))
    }

    fn current(&self) -> SyncResult<Vec<u8>> {
        let state = self.state.read().map_err(handle_poison)?;
        codec::encode(BlobKind::Acl, &state.users)
    }

    fn merge(&self, delta: &[u8]) -> SyncResult<()> {
        let remote: ORSet<String> = codec::decode(BlobKind::Acl, delta)?;

        LamportClock::check_remote(remote.max_counter())?;

        // Every element, removed ones included, must be a valid identity
        // before anything is merged
        for canonical in remote.iter().chain(remote.removed()) {
            Identity::from_canonical(canonical)
                .map_err(|e| SyncError::Decode(format!("invalid ACL entry {:?}: {}", canonical, e)))?;
        }

        let mut state = self.state.write().map_err(handle_poison)?;
        state.users.merge(&remote)?;
        state.clock.observe(remote.max_counter());

        record_counter("acl.merge", 1);
        debug!(users = state.users.len(), "Merged ACL delta");
        Ok(())
    }

    fn users(&self) -> SyncResult<Vec<Identity>> {
        let canonical: Vec<String> = self.state.read().map_err(handle_poison)?.users.elements();
        canonical.iter().map(|c| self.resolve(c)).collect()
    }
}

/// Provider for OR-Set backed ACLs
#[derive(Debug, Clone)]
pub struct OrSetAclProvider {
    identity_cache_capacity: usize,
}

impl OrSetAclProvider {
    pub fn new(identity_cache_capacity: usize) -> Self {
        OrSetAclProvider { identity_cache_capacity }
    }
}

impl Default for OrSetAclProvider {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_CACHE_CAPACITY)
    }
}

impl AclProvider for OrSetAclProvider {
    type Acl = OrSetAcl;

    fn initialize(&self) -> Self::Acl {
        OrSetAcl::new(self.identity_cache_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_acl::identity::IdentityKeypair;
    use crate::core_crdt::Stamp;

    fn identity() -> Identity {
        IdentityKeypair::generate().identity()
    }

    #[test]
    fn test_add_check_remove() {
        let acl = OrSetAcl::default();
        let alice = identity();

        acl.add(&alice).unwrap();
        assert!(acl.check(&alice).unwrap());

        acl.remove(&alice).unwrap();
        assert!(!acl.check(&alice).unwrap());
    }

    #[test]
    fn test_remove_absent_returns_noop_blob() {
        let acl = OrSetAcl::default();
        let peer = OrSetAcl::default();
        let bob = identity();
        peer.add(&bob).unwrap();

        let blob = acl.remove(&bob).unwrap();
        peer.merge(&blob).unwrap();
        assert!(peer.check(&bob).unwrap());
    }

    #[test]
    fn test_delta_reaches_peer_only_after_merge() {
        let a = OrSetAcl::default();
        let b = OrSetAcl::default();
        let pub_a = identity();

        let delta = a.add(&pub_a).unwrap();
        assert!(!b.check(&pub_a).unwrap());

        b.merge(&delta).unwrap();
        assert!(b.check(&pub_a).unwrap());
    }

    #[test]
    fn test_concurrent_adds_converge() {
        let a = OrSetAcl::default();
        let b = OrSetAcl::default();
        let carol = identity();

        let da = a.add(&carol).unwrap();
        let db = b.add(&carol).unwrap();
        a.merge(&db).unwrap();
        b.merge(&da).unwrap();

        assert!(a.check(&carol).unwrap());
        assert!(b.check(&carol).unwrap());
        assert_eq!(a.current().unwrap().len(), b.current().unwrap().len());
    }

    #[test]
    fn test_concurrent_add_remove_add_wins() {
        let a = OrSetAcl::default();
        let b = OrSetAcl::default();
        let dave = identity();

        b.merge(&a.add(&dave).unwrap()).unwrap();

        let removal = a.remove(&dave).unwrap();
        let readd = b.add(&dave).unwrap();
        a.merge(&readd).unwrap();
        b.merge(&removal).unwrap();

        assert!(a.check(&dave).unwrap());
        assert!(b.check(&dave).unwrap());
    }

    #[test]
    fn test_merge_idempotent_and_snapshot() {
        let a = OrSetAcl::default();
        let erin = identity();
        let frank = identity();
        a.add(&erin).unwrap();
        a.add(&frank).unwrap();

        let late = OrSetAcl::default();
        let snapshot = a.current().unwrap();
        late.merge(&snapshot).unwrap();
        late.merge(&snapshot).unwrap();

        let mut users = late.users().unwrap();
        users.sort_by_key(|u| u.canonical());
        let mut expected = vec![erin, frank];
        expected.sort_by_key(|u| u.canonical());
        assert_eq!(users, expected);
    }

    #[test]
    fn test_merge_rejects_garbage_without_mutation() {
        let acl = OrSetAcl::default();
        assert!(matches!(acl.merge(b"garbage"), Err(SyncError::Decode(_))));

        let mut bogus = ORSet::new();
        bogus.add("not an identity".to_string(), Stamp::new(1, "x"));
        let blob = codec::encode(BlobKind::Acl, &bogus).unwrap();
        assert!(matches!(acl.merge(&blob), Err(SyncError::Decode(_))));
        assert!(acl.is_empty().unwrap());
    }

    #[test]
    fn test_merge_rejects_invalid_removed_entry() {
        let acl = OrSetAcl::default();
        let mut bogus = ORSet::new();
        bogus.add("not an identity".to_string(), Stamp::new(1, "x"));
        bogus.remove(&"not an identity".to_string());
        assert_eq!(bogus.len(), 0);

        let blob = codec::encode(BlobKind::Acl, &bogus).unwrap();
        assert!(matches!(acl.merge(&blob), Err(SyncError::Decode(_))));
        assert!(acl.is_empty().unwrap());
    }

    #[test]
    fn test_merge_rejects_exhausting_counter() {
        let acl = OrSetAcl::default();
        let mut hostile = ORSet::new();
        hostile.add(identity().canonical(), Stamp::new(u64::MAX, "evil"));
        let blob = codec::encode(BlobKind::Acl, &hostile).unwrap();

        assert!(matches!(acl.merge(&blob), Err(SyncError::Decode(_))));
        assert!(acl.is_empty().unwrap());

        // Local adds keep working afterwards
        let alice = identity();
        acl.add(&alice).unwrap();
        assert!(acl.check(&alice).unwrap());
    }

    #[test]
    fn test_users_cache_survives_small_capacity() {
        let acl = OrSetAcl::new(1);
        for _ in 0..5 {
            acl.add(&identity()).unwrap();
        }
        assert_eq!(acl.users().unwrap().len(), 5);
        assert_eq!(acl.users().unwrap().len(), 5);
    }

    #[test]
    fn test_provider_initializes_empty_acl() {
        let acl = OrSetAclProvider::default().initialize();
        assert!(acl.is_empty().unwrap());
    }
}
