/// Keychain replication and key cache tests
///
/// Run with: cargo test --test keychain

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use swarmsync_core::core_crdt::{LogElement, Stamp};
use swarmsync_core::core_keys::{
    JwkKeySerializer, KeyId, KeyRecord, KeySerializer, Keychain, KeychainProvider, LogKeychain,
    LogKeychainProvider, SymmetricKey,
};
use swarmsync_core::core_sync::codec::{self, BlobKind};
use swarmsync_core::SyncError;

/// Same wire layout as the keychain log, with no structural guarantees
#[derive(Serialize)]
struct RawLog {
    elements: BTreeMap<Stamp, LogElement<KeyRecord>>,
}

fn raw_delta(elements: Vec<(Stamp, Option<Stamp>, KeyRecord)>) -> Vec<u8> {
    let elements = elements
        .into_iter()
        .map(|(id, after, value)| (id.clone(), LogElement { id, after, value }))
        .collect();
    codec::encode(BlobKind::Keychain, &RawLog { elements }).unwrap()
}

async fn serialized_key() -> String {
    JwkKeySerializer.serialize(&SymmetricKey::generate().unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_current_fails_until_first_key() {
    let keychain = LogKeychainProvider::default().initialize();
    let err = keychain.current().await.unwrap_err();
    assert!(matches!(err, SyncError::EmptyKeychain));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_peer_sees_same_key_after_merge() {
    let a = LogKeychain::default();
    let b = LogKeychain::default();

    let (id1, k1, delta1) = a.add().await.unwrap();
    b.merge(&delta1).await.unwrap();

    let (current_id, current_key) = b.current().await.unwrap();
    assert_eq!(current_id, id1);
    assert_eq!(current_key.as_bytes(), k1.as_bytes());

    // The key survives a serializer round trip unchanged
    let serializer = JwkKeySerializer;
    let form = serializer.serialize(&current_key).await.unwrap();
    assert_eq!(serializer.deserialize(&form).await.unwrap(), k1);
}

#[tokio::test]
async fn test_concurrent_adds_converge_to_same_order() {
    let a = LogKeychain::default();
    let b = LogKeychain::default();

    let (_, _, d1) = a.add().await.unwrap();
    let (_, _, d2) = b.add().await.unwrap();

    a.merge(&d2).await.unwrap();
    b.merge(&d1).await.unwrap();

    let ids_a: Vec<_> = a.keys().await.unwrap().into_iter().map(|(id, _)| id).collect();
    let ids_b: Vec<_> = b.keys().await.unwrap().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids_a.len(), 2);
    assert_eq!(ids_a, ids_b);

    let (ca, ka) = a.current().await.unwrap();
    let (cb, kb) = b.current().await.unwrap();
    assert_eq!(ca, cb);
    assert_eq!(ka, kb);
}

#[tokio::test]
async fn test_three_peers_any_merge_order() {
    let peers: Vec<LogKeychain> = (0..3).map(|_| LogKeychain::default()).collect();

    let mut deltas = Vec::new();
    for peer in &peers {
        let (_, _, delta) = peer.add().await.unwrap();
        deltas.push(delta);
    }
    // A follow-up key on peer 0 after it has seen everything
    for delta in &deltas {
        peers[0].merge(delta).await.unwrap();
    }
    let (last_id, _, last_delta) = peers[0].add().await.unwrap();
    deltas.push(last_delta);

    let orders: [&[usize]; 3] = [&[0, 1, 2, 3], &[3, 2, 1, 0], &[2, 0, 3, 1]];
    let mut observed = Vec::new();
    for order in orders {
        let replica = LogKeychain::default();
        for &i in order {
            replica.merge(&deltas[i]).await.unwrap();
        }
        let ids: Vec<_> = replica.keys().await.unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(replica.current().await.unwrap().0, last_id);
        observed.push(ids);
    }

    assert_eq!(observed[0].len(), 4);
    assert!(observed.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_get_key_hits_cache_and_survives_eviction() {
    let keychain = LogKeychainProvider::new(2).initialize();

    let (first_id, first_key, _) = keychain.add().await.unwrap();
    assert_eq!(keychain.get_key(&first_id).unwrap(), Some(first_key.clone()));

    keychain.add().await.unwrap();
    keychain.add().await.unwrap();

    // Capacity 2: the oldest key has been evicted from the cache
    assert_eq!(keychain.get_key(&first_id).unwrap(), None);

    let keys = keychain.keys().await.unwrap();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys[0], (first_id, first_key.clone()));

    // keys() repopulated the cache for whatever it touched last
    assert!(keychain.cache().len().unwrap() <= 2);
}

#[tokio::test]
async fn test_forced_eviction() {
    let keychain = LogKeychain::default();
    let (id, key, _) = keychain.add().await.unwrap();

    assert!(keychain.cache().evict(&id).unwrap());
    assert_eq!(keychain.get_key(&id).unwrap(), None);

    let keys = keychain.keys().await.unwrap();
    assert_eq!(keys, vec![(id, key)]);
    assert!(keychain.get_key(&id).unwrap().is_some());
}

#[tokio::test]
async fn test_history_bootstraps_late_peer() {
    let a = LogKeychain::default();
    for _ in 0..5 {
        a.add().await.unwrap();
    }

    let late = LogKeychain::default();
    late.merge(&a.history().unwrap()).await.unwrap();
    late.merge(&a.history().unwrap()).await.unwrap();

    assert_eq!(late.keys().await.unwrap(), a.keys().await.unwrap());
    assert_eq!(late.len().unwrap(), 5);
}

#[tokio::test]
async fn test_malformed_delta_rejected() {
    let keychain = LogKeychain::default();
    for bad in [&b""[..], &[1u8][..], &b"\x01\x03garbage"[..], &b"\x02\x03"[..]] {
        assert!(matches!(keychain.merge(bad).await, Err(SyncError::Decode(_))));
    }
    assert!(keychain.is_empty().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_and_merges() {
    let local = Arc::new(LogKeychain::default());
    let remote = LogKeychain::default();
    let mut remote_deltas = Vec::new();
    for _ in 0..8 {
        remote_deltas.push(remote.add().await.unwrap().2);
    }

    let adds = (0..8).map(|_| {
        let keychain = local.clone();
        tokio::spawn(async move { keychain.add().await.unwrap().0 })
    });
    let merges = remote_deltas.into_iter().map(|delta| {
        let keychain = local.clone();
        tokio::spawn(async move { keychain.merge(&delta).await.unwrap() })
    });

    let added: Vec<_> = join_all(adds).await.into_iter().map(|r| r.unwrap()).collect();
    for result in join_all(merges).await {
        result.unwrap();
    }

    let unique: HashSet<_> = added.iter().collect();
    assert_eq!(unique.len(), 8);
    assert_eq!(local.len().unwrap(), 16);

    // Converges with a peer that merges the full history
    let peer = LogKeychain::default();
    peer.merge(&local.history().unwrap()).await.unwrap();
    let ours: Vec<_> = local.keys().await.unwrap().into_iter().map(|(id, _)| id).collect();
    let theirs: Vec<_> = peer.keys().await.unwrap().into_iter().map(|(id, _)| id).collect();
    assert_eq!(ours, theirs);
}

#[tokio::test]
async fn test_reused_key_id_cannot_poison_keychain() {
    let keychain = LogKeychain::default();
    let (id, key, _) = keychain.add().await.unwrap();

    let delta = raw_delta(vec![(
        Stamp::new(0, "evil"),
        None,
        KeyRecord { key_id: id, serialized: "garbage".to_string() },
    )]);
    assert!(matches!(keychain.merge(&delta).await, Err(SyncError::Decode(_))));
    assert_eq!(keychain.len().unwrap(), 1);

    // With the cache cold the stored record is still the real key
    keychain.cache().clear().unwrap();
    assert_eq!(keychain.keys().await.unwrap(), vec![(id, key.clone())]);
    assert_eq!(keychain.current().await.unwrap(), (id, key));
}

#[tokio::test]
async fn test_reused_key_id_from_peer_history_rejected() {
    let a = LogKeychain::default();
    let b = LogKeychain::default();
    let (id, _, delta) = a.add().await.unwrap();
    b.merge(&delta).await.unwrap();

    let replay = raw_delta(vec![(
        Stamp::new(5, "evil"),
        None,
        KeyRecord { key_id: id, serialized: serialized_key().await },
    )]);
    assert!(matches!(b.merge(&replay).await, Err(SyncError::Decode(_))));
    assert_eq!(b.keys().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreachable_records_rejected() {
    let keychain = LogKeychain::default();
    let x = Stamp::new(4, "evil");
    let y = Stamp::new(6, "evil");

    let self_linked = raw_delta(vec![(
        x.clone(),
        Some(x.clone()),
        KeyRecord { key_id: KeyId::generate(), serialized: serialized_key().await },
    )]);
    let cycle = raw_delta(vec![
        (x.clone(), Some(y.clone()), KeyRecord { key_id: KeyId::generate(), serialized: serialized_key().await }),
        (y, Some(x), KeyRecord { key_id: KeyId::generate(), serialized: serialized_key().await }),
    ]);

    for delta in [self_linked, cycle] {
        assert!(matches!(keychain.merge(&delta).await, Err(SyncError::Decode(_))));
    }
    assert!(keychain.is_empty().unwrap());
}

#[tokio::test]
async fn test_extreme_counter_rejected_and_adds_continue() {
    let keychain = LogKeychain::default();
    let delta = raw_delta(vec![(
        Stamp::new(u64::MAX, "evil"),
        None,
        KeyRecord { key_id: KeyId::generate(), serialized: serialized_key().await },
    )]);

    assert!(matches!(keychain.merge(&delta).await, Err(SyncError::Decode(_))));
    assert!(keychain.is_empty().unwrap());

    let (id, _, _) = keychain.add().await.unwrap();
    assert_eq!(keychain.current().await.unwrap().0, id);
}
