//! Message poller
//!
//! Picks the messages worth surfacing out of a room's log. In the default
//! freshness-window mode the poller is stateless and may return the same
//! message on several polls; consumers dedup by id (see
//! [`Conversation`](crate::chat::Conversation)).

use std::collections::HashMap;

use crate::chat::Message;
use crate::config::DeliveryMode;
use crate::types::{Identity, RoomId, Timestamp};

#[derive(Debug, Clone)]
pub struct MessagePoller {
    mode: DeliveryMode,
    freshness_ms: i64,
    /// Per-room count of log entries already considered (cursor mode)
    cursors: HashMap<RoomId, usize>,
}

impl MessagePoller {
    pub fn new(mode: DeliveryMode, freshness_ms: i64) -> Self {
        Self {
            mode,
            freshness_ms,
            cursors: HashMap::new(),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Mark the first `delivered` entries of `room` as already seen.
    ///
    /// Called on join with the history length, so history is not redelivered.
    pub fn reset_cursor(&mut self, room: &RoomId, delivered: usize) {
        self.cursors.insert(room.clone(), delivered);
    }

    pub fn cursor(&self, room: &RoomId) -> Option<usize> {
        self.cursors.get(room).copied()
    }

    /// Messages by others in `log` that should be surfaced now.
    pub fn poll(
        &mut self,
        room: &RoomId,
        log: &[Message],
        identity: &Identity,
        now: Timestamp,
    ) -> Vec<Message> {
        match self.mode {
            DeliveryMode::FreshnessWindow => log
                .iter()
                .filter(|m| !m.is_from(identity) && m.age(now) < self.freshness_ms)
                .cloned()
                .collect(),
            DeliveryMode::Cursor => {
                let cursor = self.cursors.entry(room.clone()).or_insert(0);
                // Log shrank under us (eviction): nothing past it is new
                let start = (*cursor).min(log.len());
                *cursor = log.len();
                log[start..]
                    .iter()
                    .filter(|m| !m.is_from(identity))
                    .cloned()
                    .collect()
            }
        }
    }
}
