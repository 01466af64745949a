/*
    envelope.rs - Signed, encrypted change envelopes

    What travels between peers of a swarm document:

    - document id, so a transport can route it
    - sender identity, checked against the ACL on receipt
    - the changes blob sealed under a keychain key
    - an Ed25519 signature over all of the above

    The signed payload is domain-separated and length-prefixed, so no field
    can bleed into its neighbour.
*/

use crate::core_acl::{Identity, IdentityKeypair};
use crate::core_keys::SealedChanges;
use crate::encoding::base64_bytes;
use crate::errors::SyncResult;
use serde::{Deserialize, Serialize};

const SIGNING_DOMAIN: &[u8] = b"swarmsync/envelope/v1";

/// A sealed change signed by its author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub document_id: String,
    pub sender: Identity,
    pub description: Option<String>,
    pub sealed: SealedChanges,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    /// Sign `sealed` as `author`
    pub fn sign(
        author: &IdentityKeypair,
        document_id: impl Into<String>,
        description: Option<String>,
        sealed: SealedChanges,
    ) -> Self {
        let document_id = document_id.into();
        let sender = author.identity();
        let payload = signing_payload(&document_id, &sender, description.as_deref(), &sealed);
        let signature = author.sign(&payload);
        SignedEnvelope { document_id, sender, description, sealed, signature }
    }

    /// Check the signature against the claimed sender
    pub fn verify(&self) -> SyncResult<()> {
        let payload =
            signing_payload(&self.document_id, &self.sender, self.description.as_deref(), &self.sealed);
        self.sender.verify(&payload, &self.signature)
    }
}

fn put_field(buf: &mut Vec<u8>, field: &[u8]) {
    buf.extend_from_slice(&(field.len() as u64).to_le_bytes());
    buf.extend_from_slice(field);
}

fn signing_payload(
    document_id: &str,
    sender: &Identity,
    description: Option<&str>,
    sealed: &SealedChanges,
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(
        SIGNING_DOMAIN.len() + document_id.len() + sealed.ciphertext.len() + 128,
    );
    put_field(&mut payload, SIGNING_DOMAIN);
    put_field(&mut payload, document_id.as_bytes());
    put_field(&mut payload, sender.as_bytes());
    match description {
        Some(description) => {
            payload.push(1);
            put_field(&mut payload, description.as_bytes());
        }
        None => payload.push(0),
    }
    put_field(&mut payload, sealed.key_id.as_bytes());
    put_field(&mut payload, &sealed.nonce);
    put_field(&mut payload, &sealed.ciphertext);
    payload
}
