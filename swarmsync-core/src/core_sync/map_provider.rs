/*
    map_provider.rs - Built-in JSON map document engine

    Documents are maps from string keys to JSON values. Every key is an
    independent last-write-wins register stamped with a Lamport stamp, and
    removal writes a tombstone, so concurrent edits from any number of peers
    converge regardless of delivery order.

    Wire format (inside the versioned blob frame):
    - one entry per touched key: key, stamp, JSON text or none for removal
    - local_change ships only the keys touched by that change
    - get_history ships every entry, tombstones included
*/

use super::codec::{self, BlobKind};
use super::message::{validate_document_id, SyncMessage, DEFAULT_MAX_DOCUMENT_ID_LEN};
use super::provider::CrdtProvider;
use crate::core_crdt::{Crdt, LWWEntry, LWWMap, LamportClock, Stamp};
use crate::encoding::base64_bytes;
use crate::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Mutation closure accepted by [`MapProvider::local_change`]
pub type MapChangeFn = Box<dyn for<'a> FnOnce(&mut MapWriter<'a>) + Send>;

/// Box a closure as a [`MapChangeFn`]
///
/// Taking the closure through a generic bound lets the compiler infer the
/// writer's lifetime, which a bare `Box::new(|w| ..)` cannot.
pub fn edit<F>(change: F) -> MapChangeFn
where
    F: for<'a> FnOnce(&mut MapWriter<'a>) + Send + 'static,
{
    Box::new(change)
}

/// A JSON map document
#[derive(Debug, Clone)]
pub struct MapDocument {
    state: LWWMap<Value>,
    clock: LamportClock,
}

impl MapDocument {
    /// Empty document writing under a random replica id
    pub fn new() -> Self {
        MapDocument { state: LWWMap::new(), clock: LamportClock::random() }
    }

    /// Empty document writing under `replica`
    pub fn with_replica(replica: impl Into<String>) -> Self {
        MapDocument { state: LWWMap::new(), clock: LamportClock::new(replica) }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    /// Live keys in order
    pub fn keys(&self) -> Vec<String> {
        self.state.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Live contents as a JSON object
    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> =
            self.state.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        Value::Object(object)
    }

    /// Replica id stamped on local writes
    pub fn replica(&self) -> &str {
        self.clock.replica()
    }
}

impl Default for MapDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Documents are equal when their replicated state is equal, whatever
/// replica wrote them
impl PartialEq for MapDocument {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

/// Write access to a document during one local change
pub struct MapWriter<'a> {
    document: &'a mut MapDocument,
    touched: BTreeSet<String>,
    /// First write that could not be stamped; reported by finish()
    failed: Option<SyncError>,
}

impl<'a> MapWriter<'a> {
    fn new(document: &'a mut MapDocument) -> Self {
        MapWriter { document, touched: BTreeSet::new(), failed: None }
    }

    /// Set `key` to `value`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.write(key.into(), Some(value.into()));
    }

    /// Remove `key`, leaving a tombstone
    pub fn remove(&mut self, key: impl Into<String>) {
        self.write(key.into(), None);
    }

    fn write(&mut self, key: String, value: Option<Value>) {
        if self.failed.is_some() {
            return;
        }
        match self.document.clock.tick() {
            Ok(stamp) => {
                self.document.state.write(key.clone(), value, stamp);
                self.touched.insert(key);
            }
            Err(e) => self.failed = Some(e),
        }
    }

    /// Read a value, including writes made earlier in this change
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.state.get(key)
    }

    fn finish(self) -> SyncResult<(LWWMap<Value>, usize)> {
        if let Some(e) = self.failed {
            return Err(e);
        }
        let delta = self.document.state.delta_for(&self.touched);
        Ok((delta, self.touched.len()))
    }
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    key: String,
    stamp: Stamp,
    /// JSON text, absent for a removal
    value: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireChanges {
    entries: Vec<WireEntry>,
}

fn encode_changes(state: &LWWMap<Value>) -> SyncResult<Vec<u8>> {
    let entries = state
        .raw_entries()
        .map(|(key, entry)| -> SyncResult<WireEntry> {
            let value = match &entry.value {
                Some(value) => Some(
                    serde_json::to_string(value).map_err(|e| SyncError::Serialization(e.to_string()))?,
                ),
                None => None,
            };
            Ok(WireEntry { key: key.clone(), stamp: entry.stamp.clone(), value })
        })
        .collect::<SyncResult<Vec<_>>>()?;

    codec::encode(BlobKind::Document, &WireChanges { entries })
}

fn decode_changes(changes: &[u8]) -> SyncResult<LWWMap<Value>> {
    let wire: WireChanges = codec::decode(BlobKind::Document, changes)?;

    wire.entries
        .into_iter()
        .map(|entry| -> SyncResult<(String, LWWEntry<Value>)> {
            let value = entry
                .value
                .as_deref()
                .map(|text| serde_json::from_str::<Value>(text))
                .transpose()?;
            Ok((entry.key, LWWEntry { value, stamp: entry.stamp }))
        })
        .collect()
}

/// Message for [`MapProvider`] documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMessage {
    pub document_id: String,

    /// Content hash of `changes`, lets transports drop duplicates cheaply
    pub change_id: Option<String>,

    pub description: Option<String>,

    #[serde(with = "base64_bytes")]
    pub changes: Vec<u8>,
}

impl MapMessage {
    fn new(document_id: impl Into<String>) -> Self {
        MapMessage { document_id: document_id.into(), change_id: None, description: None, changes: Vec::new() }
    }
}

impl SyncMessage for MapMessage {
    type Changes = Vec<u8>;

    fn document_id(&self) -> &str {
        &self.document_id
    }

    fn changes(&self) -> &Vec<u8> {
        &self.changes
    }

    fn set_changes(&mut self, changes: Vec<u8>) {
        self.change_id = Some(blake3::hash(&changes).to_hex().to_string());
        self.changes = changes;
    }

    fn set_description(&mut self, description: &str) {
        self.description = Some(description.to_string());
    }
}

/// Provider for [`MapDocument`]
#[derive(Debug, Clone)]
pub struct MapProvider {
    max_document_id_len: usize,
}

impl MapProvider {
    pub fn new(max_document_id_len: usize) -> Self {
        MapProvider { max_document_id_len }
    }
}

impl Default for MapProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DOCUMENT_ID_LEN)
    }
}

impl CrdtProvider for MapProvider {
    type Document = MapDocument;
    type Changes = Vec<u8>;
    type ChangeFn = MapChangeFn;
    type Message = MapMessage;

    fn new_document(&self) -> MapDocument {
        MapDocument::new()
    }

    fn new_message(&self, document_id: &str) -> SyncResult<MapMessage> {
        validate_document_id(document_id, self.max_document_id_len)?;
        Ok(MapMessage::new(document_id))
    }

    fn local_change(
        &self,
        document: &mut MapDocument,
        description: &str,
        change: MapChangeFn,
    ) -> SyncResult<Vec<u8>> {
        let mut writer = MapWriter::new(document);
        change(&mut writer);
        let (delta, touched) = writer.finish()?;

        debug!(description, touched, "Applied local change");
        encode_changes(&delta)
    }

    fn remote_change(&self, document: &mut MapDocument, changes: &Vec<u8>) -> SyncResult<()> {
        let remote = decode_changes(changes)?;
        LamportClock::check_remote(remote.max_counter())?;

        document.state.merge(&remote)?;
        document.clock.observe(remote.max_counter());
        Ok(())
    }

    fn get_history(&self, document: &MapDocument) -> SyncResult<Vec<u8>> {
        encode_changes(&document.state)
    }
}
