//! Chat message records as stored in the shared `messages` table

use serde::{Deserialize, Serialize};

use crate::types::{random_base36, short_id, Identity, RoomId, Timestamp};

/// Kind of message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
}

/// A chat message appended to a room's log.
///
/// Messages are append-only: once written under a room they are never
/// mutated. The id is `<ms>-<random9>` so concurrent authors don't collide.
///
/// # Example
///
/// ```ignore
/// let message = Message::text(&identity, "Love", &RoomId::from("r1"), "hi", 2000);
/// assert_eq!(message.chat_id, "r1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Process-unique message id
    pub id: String,
    /// Message body
    pub content: String,
    /// Author identity
    pub author: String,
    /// Author display name at send time
    #[serde(default)]
    pub author_name: String,
    /// Creation time (ms since epoch)
    pub timestamp: Timestamp,
    /// Payload kind
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Room the message belongs to
    pub chat_id: String,
}

impl Message {
    /// Build a new text message with a fresh id.
    pub fn text(
        author: &Identity,
        author_name: impl Into<String>,
        room: &RoomId,
        content: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Self::generate_id(now),
            content: content.into(),
            author: author.as_str().to_string(),
            author_name: author_name.into(),
            timestamp: now,
            kind: MessageKind::Text,
            chat_id: room.as_str().to_string(),
        }
    }

    /// `<ms>-<random9>`
    pub fn generate_id(now: Timestamp) -> String {
        format!("{}-{}", now, random_base36(9))
    }

    pub fn is_from(&self, identity: &Identity) -> bool {
        identity == &self.author
    }

    /// Milliseconds since the message was created.
    pub fn age(&self, now: Timestamp) -> i64 {
        now.saturating_sub(self.timestamp)
    }

    /// Author name if set, otherwise the tail of the author id.
    pub fn display_author(&self) -> String {
        if self.author_name.is_empty() {
            format!("{}...", short_id(&self.author))
        } else {
            self.author_name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_fields() {
        let me = Identity::from_string("pk-me");
        let msg = Message::text(&me, "Love", &RoomId::from("r1"), "hi", 2000);

        assert!(msg.id.starts_with("2000-"));
        assert_eq!(msg.id.len(), "2000-".len() + 9);
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.author, "pk-me");
        assert_eq!(msg.author_name, "Love");
        assert_eq!(msg.timestamp, 2000);
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.chat_id, "r1");
        assert!(msg.is_from(&me));
    }

    #[test]
    fn test_ids_differ_within_same_millisecond() {
        let me = Identity::from_string("pk-me");
        let room = RoomId::from("r1");
        let a = Message::text(&me, "", &room, "a", 5);
        let b = Message::text(&me, "", &room, "b", 5);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_wire_layout() {
        let msg = Message {
            id: "m1".to_string(),
            content: "hi".to_string(),
            author: "pk-a".to_string(),
            author_name: "A".to_string(),
            timestamp: 2000,
            kind: MessageKind::Text,
            chat_id: "r1".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["authorName"], "A");
        assert_eq!(json["chatId"], "r1");
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let json = r#"{"id":"m1","content":"hi","author":"pk-a","timestamp":1,"chatId":"r1"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.author_name, "");
        assert_eq!(msg.kind, MessageKind::Text);
    }

    #[test]
    fn test_display_author() {
        let mut msg = Message::text(
            &Identity::from_string("pk-abcdefghijklmnop"),
            "",
            &RoomId::from("r1"),
            "x",
            0,
        );
        assert_eq!(msg.display_author(), "ijklmnop...");
        msg.author_name = "Joy".to_string();
        assert_eq!(msg.display_author(), "Joy");
    }
}
