//! The `peers` and `messages` tables on top of a [`SharedStore`]
//!
//! Layout (JSON values):
//!
//! ```text
//! pearchat-p2p-peers    { "<id>": { "id", "lastSeen", "room" }, ... }
//! pearchat-p2p-network  { "<room>": [ { "id", "content", "author", ... }, ... ], ... }
//! ```
//!
//! There is no schema version. Readers skip entries they cannot parse instead
//! of failing the whole table. Store failures never escape: reads degrade to
//! empty tables and writes are dropped until the next tick retries them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{SharedStore, StoreChange};
use crate::chat::Message;
use crate::error::ChatResult;
use crate::types::{PeerRecord, RoomId, Timestamp};

/// Default key of the peers table
pub const DEFAULT_PEERS_KEY: &str = "pearchat-p2p-peers";
/// Default key of the room -> messages map
pub const DEFAULT_MESSAGES_KEY: &str = "pearchat-p2p-network";

/// Typed access to the two logical tables.
#[derive(Clone)]
pub struct PresenceTables {
    store: Arc<dyn SharedStore>,
    peers_key: String,
    messages_key: String,
}

impl PresenceTables {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_keys(store, DEFAULT_PEERS_KEY, DEFAULT_MESSAGES_KEY)
    }

    pub fn with_keys(
        store: Arc<dyn SharedStore>,
        peers_key: impl Into<String>,
        messages_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            peers_key: peers_key.into(),
            messages_key: messages_key.into(),
        }
    }

    pub fn peers_key(&self) -> &str {
        &self.peers_key
    }

    pub fn messages_key(&self) -> &str {
        &self.messages_key
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peers
    // ═══════════════════════════════════════════════════════════════════════

    /// Read the peers table, propagating store failures.
    pub fn try_get_peers(&self) -> ChatResult<BTreeMap<String, PeerRecord>> {
        let raw = self.store.get(&self.peers_key)?;
        Ok(raw.map(|raw| parse_peers(&raw)).unwrap_or_default())
    }

    /// Read the peers table; empty on any failure.
    pub fn get_peers(&self) -> BTreeMap<String, PeerRecord> {
        self.try_get_peers().unwrap_or_else(|e| {
            warn!(key = %self.peers_key, error = %e, "Peers read failed, treating as empty");
            BTreeMap::new()
        })
    }

    /// Replace the whole peers table in one write.
    pub fn try_put_peers(&self, peers: &BTreeMap<String, PeerRecord>) -> ChatResult<()> {
        let data = serde_json::to_string(peers)?;
        self.store.set(&self.peers_key, &data)
    }

    /// Replace the whole peers table; returns whether the write landed.
    pub fn put_peers(&self, peers: &BTreeMap<String, PeerRecord>) -> bool {
        match self.try_put_peers(peers) {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %self.peers_key, error = %e, "Peers write dropped");
                false
            }
        }
    }

    /// Read-modify-write of the full table with `record` overwriting its id.
    pub fn upsert_peer(&self, record: PeerRecord) -> bool {
        let mut peers = match self.try_get_peers() {
            Ok(peers) => peers,
            Err(e) => {
                warn!(key = %self.peers_key, error = %e, "Heartbeat skipped, store unreadable");
                return false;
            }
        };
        peers.insert(record.id.clone(), record);
        self.put_peers(&peers)
    }

    /// Delete one record; a no-op if it is not present.
    pub fn remove_peer(&self, id: &str) -> bool {
        let mut peers = match self.try_get_peers() {
            Ok(peers) => peers,
            Err(e) => {
                warn!(key = %self.peers_key, error = %e, "Peer removal skipped");
                return false;
            }
        };
        if peers.remove(id).is_none() {
            return true;
        }
        self.put_peers(&peers)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Messages
    // ═══════════════════════════════════════════════════════════════════════

    /// Messages of a room in append order, propagating store failures.
    pub fn try_get_messages(&self, room: &RoomId) -> ChatResult<Vec<Message>> {
        let Some(raw) = self.store.get(&self.messages_key)? else {
            return Ok(Vec::new());
        };
        let rooms = parse_object(&raw, &self.messages_key);
        Ok(rooms
            .get(room.as_str())
            .map(parse_messages)
            .unwrap_or_default())
    }

    /// Messages of a room in append order; empty on any failure.
    pub fn get_messages(&self, room: &RoomId) -> Vec<Message> {
        self.try_get_messages(room).unwrap_or_else(|e| {
            warn!(%room, error = %e, "Messages read failed, treating as empty");
            Vec::new()
        })
    }

    /// Append to a room's log with a read-modify-write of the whole map.
    ///
    /// Other rooms and entries this reader cannot parse are written back
    /// untouched. Two processes appending to the same key at the same time
    /// can lose one append; nothing here locks.
    pub fn try_append_message(&self, room: &RoomId, message: &Message) -> ChatResult<()> {
        let mut rooms = match self.store.get(&self.messages_key)? {
            Some(raw) => parse_object(&raw, &self.messages_key),
            None => Map::new(),
        };

        let entry = rooms
            .entry(room.as_str().to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            debug!(%room, "Replacing malformed room log");
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(log) = entry {
            log.push(serde_json::to_value(message)?);
        }

        let data = serde_json::to_string(&rooms)?;
        self.store.set(&self.messages_key, &data)
    }

    /// Append to a room's log; returns whether the write landed.
    pub fn append_message(&self, room: &RoomId, message: &Message) -> bool {
        match self.try_append_message(room, message) {
            Ok(()) => true,
            Err(e) => {
                warn!(%room, message_id = %message.id, error = %e, "Message append dropped");
                false
            }
        }
    }

    /// Drop every stored message with `now - timestamp >= retention_ms`.
    ///
    /// Unparseable entries are dropped too. Returns how many entries were
    /// removed; the map is only rewritten if that is non-zero.
    pub fn evict_expired_messages(&self, now: Timestamp, retention_ms: i64) -> usize {
        let raw = match self.store.get(&self.messages_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "Message eviction skipped, store unreadable");
                return 0;
            }
        };

        let mut rooms = parse_object(&raw, &self.messages_key);
        let mut evicted = 0;
        for log in rooms.values_mut() {
            if let Value::Array(entries) = log {
                let before = entries.len();
                entries.retain(|entry| {
                    serde_json::from_value::<Message>(entry.clone())
                        .map(|m| m.age(now) < retention_ms)
                        .unwrap_or(false)
                });
                evicted += before - entries.len();
            }
        }

        if evicted > 0 {
            let written = serde_json::to_string(&rooms)
                .map_err(Into::into)
                .and_then(|data| self.store.set(&self.messages_key, &data));
            if let Err(e) = written {
                warn!(error = %e, "Message eviction write dropped");
                return 0;
            }
            debug!(evicted, "Evicted expired messages");
        }
        evicted
    }
}

/// Parse a JSON object, or log and return an empty one.
fn parse_object(raw: &str, key: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            debug!(key, "Stored value is not an object, ignoring");
            Map::new()
        }
        Err(e) => {
            debug!(key, error = %e, "Stored value is not JSON, ignoring");
            Map::new()
        }
    }
}

fn parse_peers(raw: &str) -> BTreeMap<String, PeerRecord> {
    parse_object(raw, "peers")
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value::<PeerRecord>(value) {
            Ok(record) if record.id != id => {
                debug!(
                    peer_id = %id,
                    record_id = %record.id,
                    "Skipping peer record filed under another id"
                );
                None
            }
            Ok(record) => Some((id, record)),
            Err(e) => {
                debug!(peer_id = %id, error = %e, "Skipping malformed peer record");
                None
            }
        })
        .collect()
}

fn parse_messages(log: &Value) -> Vec<Message> {
    let Value::Array(entries) = log else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| serde_json::from_value::<Message>(entry.clone()).ok())
        .collect()
}
