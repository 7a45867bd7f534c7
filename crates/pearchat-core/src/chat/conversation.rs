//! Consumer-side message history for one room
//!
//! The message poller may hand the same message over several times while it
//! is still inside the freshness window. A [`Conversation`] absorbs those
//! repeats: it keeps one copy per message id, ordered by timestamp.

use std::collections::HashSet;

use super::message::Message;
use crate::types::{RoomId, Timestamp};

/// Deduplicated, chronologically ordered messages of a room.
///
/// # Example
///
/// ```ignore
/// let mut conversation = Conversation::new(join.room_id.clone());
/// conversation.merge(join.messages);
///
/// while let Ok(ChatEvent::MessageReceived(msg)) = events.recv().await {
///     if conversation.add_message(msg) {
///         // render it
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Room this history belongs to
    pub room_id: RoomId,
    /// Messages in chronological order (oldest first)
    messages: Vec<Message>,
    /// Ids already present in `messages`
    seen: HashSet<String>,
    /// Latest message timestamp
    pub last_activity: Timestamp,
}

impl Conversation {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            messages: Vec::new(),
            seen: HashSet::new(),
            last_activity: 0,
        }
    }

    /// Add a message, keeping timestamp order.
    ///
    /// Returns `false` if a message with the same id is already present, or if
    /// the message belongs to another room.
    pub fn add_message(&mut self, message: Message) -> bool {
        if message.chat_id != self.room_id.as_str() || self.seen.contains(&message.id) {
            return false;
        }

        if message.timestamp > self.last_activity {
            self.last_activity = message.timestamp;
        }

        // Equal timestamps keep arrival order
        let pos = self
            .messages
            .iter()
            .position(|m| m.timestamp > message.timestamp)
            .unwrap_or(self.messages.len());
        self.seen.insert(message.id.clone());
        self.messages.insert(pos, message);
        true
    }

    /// Merge a batch, returning how many were new.
    pub fn merge(&mut self, messages: impl IntoIterator<Item = Message>) -> usize {
        messages
            .into_iter()
            .fold(0, |added, m| added + usize::from(self.add_message(m)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// All messages in chronological order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
