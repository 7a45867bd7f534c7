//! Peer liveness records
//!
//! A [`PeerRecord`] is one participant's latest heartbeat in one room. The
//! whole `peers` table is a map of participant id to record, and each
//! participant only ever writes its own entry.

use serde::{Deserialize, Serialize};

use super::{RoomId, Timestamp};

/// A participant's most recent liveness announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Participant identity
    pub id: String,
    /// When the participant last heartbeated (ms since epoch)
    pub last_seen: Timestamp,
    /// Room the participant is currently in
    pub room: String,
}

impl PeerRecord {
    pub fn new(id: impl Into<String>, last_seen: Timestamp, room: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_seen,
            room: room.into(),
        }
    }

    /// Milliseconds elapsed since the last heartbeat.
    pub fn age(&self, now: Timestamp) -> i64 {
        now.saturating_sub(self.last_seen)
    }

    /// Whether the record was refreshed strictly less than `timeout_ms` ago.
    pub fn is_live(&self, now: Timestamp, timeout_ms: i64) -> bool {
        self.age(now) < timeout_ms
    }

    pub fn in_room(&self, room: &RoomId) -> bool {
        self.room == room.as_str()
    }
}
