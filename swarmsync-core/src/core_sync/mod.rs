/*
    Sync subsystem - the document provider contract and its plumbing

    - provider:     CrdtProvider trait implemented by document engines
    - message:      SyncMessage envelopes and document id validation
    - map_provider: built-in JSON map engine
    - codec:        versioned binary framing shared by all change blobs
    - serializer:   JSON transport encoding
*/

pub mod codec;
pub mod map_provider;
pub mod message;
pub mod provider;
pub mod serializer;

pub use codec::{BlobKind, FORMAT_VERSION};
pub use map_provider::{edit, MapChangeFn, MapDocument, MapMessage, MapProvider, MapWriter};
pub use message::{validate_document_id, SyncMessage, DEFAULT_MAX_DOCUMENT_ID_LEN};
pub use provider::CrdtProvider;
pub use serializer::JsonMessageSerializer;
