/*
    ACL subsystem - who may write a document

    Identities are Ed25519 public keys. The ACL replicates as an add-wins
    OR-Set so authorization changes merge like any other change.
*/

pub mod acl;
pub mod identity;

pub use acl::{Acl, AclProvider, OrSetAcl, OrSetAclProvider, DEFAULT_IDENTITY_CACHE_CAPACITY};
pub use identity::{Identity, IdentityKeypair};
