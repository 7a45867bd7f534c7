//! Heartbeat record construction

use crate::types::{Identity, PeerRecord, RoomId, Timestamp};

/// The record this participant publishes on every heartbeat.
///
/// Overwrites any earlier record for the same id, so republishing is
/// idempotent and a room switch moves the record instead of duplicating it.
pub fn heartbeat_record(identity: &Identity, room: &RoomId, now: Timestamp) -> PeerRecord {
    PeerRecord::new(identity.as_str(), now, room.as_str())
}
