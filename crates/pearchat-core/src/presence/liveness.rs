//! Liveness scanner
//!
//! Turns the `peers` table into connect/disconnect transitions by diffing the
//! live set of each scan against the previous one. The previous live set is
//! the only state kept between scans.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::events::ChatEvent;
use crate::types::{short_id, Identity, PeerRecord, RoomId, Timestamp};

/// Ids of remote peers in `room` that heartbeated less than `timeout_ms` ago.
///
/// The local participant never counts, even if its own record is live.
pub fn live_peers(
    peers: &BTreeMap<String, PeerRecord>,
    identity: &Identity,
    room: &RoomId,
    now: Timestamp,
    timeout_ms: i64,
) -> BTreeSet<String> {
    peers
        .iter()
        .filter(|(id, record)| {
            identity != id.as_str() && record.in_room(room) && record.is_live(now, timeout_ms)
        })
        .map(|(id, _)| id.clone())
        .collect()
}

#[derive(Debug, Clone)]
pub struct LivenessScanner {
    timeout_ms: i64,
    live: BTreeSet<String>,
}

impl LivenessScanner {
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            timeout_ms,
            live: BTreeSet::new(),
        }
    }

    /// Peers considered live as of the last scan.
    pub fn live(&self) -> &BTreeSet<String> {
        &self.live
    }

    pub fn count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains(id)
    }

    /// Scan `peers` and return the transitions since the previous scan.
    ///
    /// Order: count change first, then connects, then disconnects.
    pub fn scan(
        &mut self,
        peers: &BTreeMap<String, PeerRecord>,
        identity: &Identity,
        room: &RoomId,
        now: Timestamp,
    ) -> Vec<ChatEvent> {
        let current = live_peers(peers, identity, room, now, self.timeout_ms);
        let mut events = Vec::new();

        if current.len() != self.live.len() {
            debug!(
                %room,
                previous = self.live.len(),
                count = current.len(),
                "Peer count changed"
            );
            events.push(ChatEvent::PeerCountChanged {
                count: current.len(),
            });
        }

        for id in current.difference(&self.live) {
            debug!(%room, peer = short_id(id), "Peer connected");
            events.push(ChatEvent::PeerConnected {
                peer_id: id.clone(),
            });
        }

        for id in self.live.difference(&current) {
            debug!(%room, peer = short_id(id), "Peer no longer live");
            events.push(ChatEvent::PeerDisconnected {
                peer_id: id.clone(),
            });
        }

        self.live = current;
        events
    }

    /// Drop ids whose records were deleted out from under the scanner.
    ///
    /// Only ids still in the live set produce a disconnect, so a transition
    /// the last scan already reported is never reported again.
    pub fn forget<'a>(&mut self, ids: impl IntoIterator<Item = &'a String>) -> Vec<ChatEvent> {
        let mut events: Vec<ChatEvent> = ids
            .into_iter()
            .filter(|id| self.live.remove(id.as_str()))
            .map(|id| ChatEvent::PeerDisconnected {
                peer_id: id.clone(),
            })
            .collect();

        if !events.is_empty() {
            events.push(ChatEvent::PeerCountChanged {
                count: self.live.len(),
            });
        }
        events
    }

    /// Disconnect every live peer, as when leaving the room.
    pub fn forget_all(&mut self) -> Vec<ChatEvent> {
        let ids: Vec<String> = self.live.iter().cloned().collect();
        self.forget(&ids)
    }
}
