/// End-to-end swarm document scenarios
///
/// Three peers share a document over a simulated transport that delivers
/// JSON-encoded envelopes out of order and more than once.
///
/// Run with: cargo test --test swarm_scenario

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use swarmsync_core::core_acl::{Acl, IdentityKeypair};
use swarmsync_core::core_keys::Keychain;
use swarmsync_core::core_swarm::{ChangeOrigin, MapSwarmDocument, ReceiveOutcome, SignedEnvelope};
use swarmsync_core::core_sync::{edit, JsonMessageSerializer};
use swarmsync_core::SyncConfig;

fn peer() -> MapSwarmDocument {
    MapSwarmDocument::open("team/board", IdentityKeypair::generate(), &SyncConfig::default()).unwrap()
}

/// Push an envelope through the JSON transport
fn transmit(envelope: &SignedEnvelope) -> SignedEnvelope {
    let bytes = JsonMessageSerializer.encode(envelope).unwrap();
    JsonMessageSerializer.decode(&bytes).unwrap()
}

/// Creator admits `peer`: ACL both ways and the creator's key history
async fn admit(creator: &MapSwarmDocument, others: &[&MapSwarmDocument], peer: &MapSwarmDocument) {
    let delta = creator.acl().add(&peer.identity()).unwrap();
    for other in others {
        other.acl().merge(&delta).unwrap();
    }
    peer.acl().merge(&creator.acl().current().unwrap()).unwrap();
    peer.keychain().merge(&creator.keychain().history().unwrap()).await.unwrap();
}

#[tokio::test]
async fn test_three_peers_converge() {
    let alice = peer();
    let bob = peer();
    let carol = peer();

    alice.bootstrap().await.unwrap();
    admit(&alice, &[], &bob).await;
    admit(&alice, &[&bob], &carol).await;

    let mut outbox = Vec::new();
    outbox.push((0, alice.change("title", edit(|w| w.set("title", "Roadmap"))).await.unwrap()));
    outbox.push((1, bob.change("owner", edit(|w| w.set("owner", "bob"))).await.unwrap()));
    outbox.push((2, carol.change("tags", edit(|w| w.set("tags", json!(["q3", "infra"])))).await.unwrap()));
    outbox.push((1, bob.change("retitle", edit(|w| w.set("title", "Roadmap v2"))).await.unwrap()));

    let peers = [&alice, &bob, &carol];
    // Deliver in reverse, twice
    for _ in 0..2 {
        for (origin, envelope) in outbox.iter().rev() {
            for (index, target) in peers.iter().enumerate() {
                if index == *origin {
                    continue;
                }
                let outcome = target.receive(&transmit(envelope)).await.unwrap();
                assert_eq!(outcome, ReceiveOutcome::Applied);
            }
        }
    }

    let expected = alice.read(|d| d.to_json()).unwrap();
    assert_eq!(bob.read(|d| d.to_json()).unwrap(), expected);
    assert_eq!(carol.read(|d| d.to_json()).unwrap(), expected);
    assert_eq!(expected["owner"], json!("bob"));
    assert_eq!(expected["tags"], json!(["q3", "infra"]));
}

#[tokio::test]
async fn test_revoked_peer_is_rejected() {
    let alice = peer();
    let bob = peer();
    alice.bootstrap().await.unwrap();
    admit(&alice, &[], &bob).await;

    let before = bob.change("ok", edit(|w| w.set("bob", 1))).await.unwrap();
    assert_eq!(alice.receive(&before).await.unwrap(), ReceiveOutcome::Applied);

    alice.acl().remove(&bob.identity()).unwrap();
    let after = bob.change("late", edit(|w| w.set("bob", 2))).await.unwrap();
    assert_eq!(
        alice.receive(&after).await.unwrap(),
        ReceiveOutcome::Rejected { sender: bob.identity() }
    );
    assert_eq!(alice.read(|d| d.get("bob").cloned()).unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_key_rotation_and_late_joiner() {
    let alice = peer();
    let bob = peer();
    alice.bootstrap().await.unwrap();
    admit(&alice, &[], &bob).await;

    let mut events = bob.subscribe();

    let first = alice.change("one", edit(|w| w.set("n", 1))).await.unwrap();
    let (rotated, _, rotation) = alice.keychain().add().await.unwrap();
    let second = alice.change("two", edit(|w| w.set("n", 2))).await.unwrap();
    assert_eq!(second.sealed.key_id, rotated);
    assert_ne!(first.sealed.key_id, rotated);

    // Bob gets the second change before the rotated key
    assert_eq!(bob.receive(&second).await.unwrap(), ReceiveOutcome::Deferred { key_id: rotated });
    assert_eq!(bob.receive(&first).await.unwrap(), ReceiveOutcome::Applied);
    bob.keychain().merge(&rotation).await.unwrap();
    assert_eq!(bob.receive(&second).await.unwrap(), ReceiveOutcome::Applied);
    assert_eq!(bob.read(|d| d.get("n").cloned()).unwrap(), Some(json!(2)));

    let event = events.recv().await.unwrap();
    assert_eq!(event.origin, ChangeOrigin::Remote(alice.identity()));
    assert_eq!(event.description.as_deref(), Some("one"));

    // Dave joins after the fact and catches up from one history envelope
    let dave = peer();
    admit(&alice, &[&bob], &dave).await;
    let history = alice.history_envelope().await.unwrap();
    assert_eq!(dave.receive(&transmit(&history)).await.unwrap(), ReceiveOutcome::Applied);
    assert_eq!(dave.read(|d| d.to_json()).unwrap(), alice.read(|d| d.to_json()).unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_receive_converges() {
    let alice = Arc::new(peer());
    let bob = peer();
    let carol = peer();
    let observer = peer();

    alice.bootstrap().await.unwrap();
    admit(&alice, &[], &bob).await;
    admit(&alice, &[&bob], &carol).await;
    admit(&alice, &[&bob, &carol], &observer).await;

    let mut outbox = Vec::new();
    for i in 0..12 {
        let writer = if i % 2 == 0 { &bob } else { &carol };
        let key = format!("k{}", i % 5);
        outbox.push(writer.change("edit", edit(move |w| w.set(key, i))).await.unwrap());
    }

    // Every envelope lands twice, from separate tasks, while alice keeps editing
    let receives = outbox.iter().chain(outbox.iter()).cloned().map(|envelope| {
        let alice = alice.clone();
        tokio::spawn(async move { alice.receive(&envelope).await.unwrap() })
    });
    let local = {
        let alice = alice.clone();
        tokio::spawn(async move {
            let mut sent = Vec::new();
            for i in 0..4 {
                sent.push(alice.change("local", edit(move |w| w.set(format!("a{}", i), i))).await.unwrap());
            }
            sent
        })
    };

    for outcome in join_all(receives).await {
        assert_eq!(outcome.unwrap(), ReceiveOutcome::Applied);
    }
    let alice_changes = local.await.unwrap();

    for envelope in outbox.iter().rev().chain(alice_changes.iter()) {
        assert_eq!(observer.receive(&transmit(envelope)).await.unwrap(), ReceiveOutcome::Applied);
    }

    let expected = observer.read(|d| d.to_json()).unwrap();
    assert_eq!(alice.read(|d| d.to_json()).unwrap(), expected);
    assert_eq!(expected["a3"], json!(3));
}
