//! Events published by the chat service
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ChatEvent                                                      │
//! │  ├── Ready: identity generated, service usable                  │
//! │  ├── RoomJoined / RoomLeft: local room membership changed       │
//! │  ├── PeerConnected / PeerDisconnected: liveness transitions     │
//! │  ├── PeerCountChanged: size of the live set changed             │
//! │  └── MessageReceived: message by another author                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events go out on a broadcast channel. A subscriber that is too slow loses
//! the oldest events rather than blocking the presence loop.

use std::fmt;

use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::chat::Message;
use crate::types::{Identity, RoomId};

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The service generated its identity
    Ready { identity: Identity },
    /// The local participant switched into a room
    RoomJoined { room_id: RoomId, message_count: usize },
    /// The local participant left its room
    RoomLeft { room_id: RoomId },
    /// A remote peer became live in the current room
    PeerConnected { peer_id: String },
    /// A previously live remote peer expired or left the room
    PeerDisconnected { peer_id: String },
    /// Number of live remote peers changed
    PeerCountChanged { count: usize },
    /// Fresh message by another author in the current room
    MessageReceived(Message),
}

impl ChatEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChatEvent::Ready { .. } => EventKind::Ready,
            ChatEvent::RoomJoined { .. } => EventKind::RoomJoined,
            ChatEvent::RoomLeft { .. } => EventKind::RoomLeft,
            ChatEvent::PeerConnected { .. } => EventKind::PeerConnected,
            ChatEvent::PeerDisconnected { .. } => EventKind::PeerDisconnected,
            ChatEvent::PeerCountChanged { .. } => EventKind::PeerCountChanged,
            ChatEvent::MessageReceived(_) => EventKind::MessageReceived,
        }
    }
}

impl fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatEvent::Ready { identity } => write!(f, "ready {}", identity.short()),
            ChatEvent::RoomJoined {
                room_id,
                message_count,
            } => write!(f, "room-joined {} ({} messages)", room_id, message_count),
            ChatEvent::RoomLeft { room_id } => write!(f, "room-left {}", room_id),
            ChatEvent::PeerConnected { peer_id } => {
                write!(f, "peer-connected {}", crate::types::short_id(peer_id))
            }
            ChatEvent::PeerDisconnected { peer_id } => {
                write!(f, "peer-disconnected {}", crate::types::short_id(peer_id))
            }
            ChatEvent::PeerCountChanged { count } => write!(f, "peer-count-changed {}", count),
            ChatEvent::MessageReceived(message) => write!(
                f,
                "message-received [{}] {}",
                message.display_author(),
                message.content
            ),
        }
    }
}

/// Event names, used to subscribe to a subset of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    RoomJoined,
    RoomLeft,
    PeerConnected,
    PeerDisconnected,
    PeerCountChanged,
    MessageReceived,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::RoomJoined => "room-joined",
            EventKind::RoomLeft => "room-left",
            EventKind::PeerConnected => "peer-connected",
            EventKind::PeerDisconnected => "peer-disconnected",
            EventKind::PeerCountChanged => "peer-count-changed",
            EventKind::MessageReceived => "message-received",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publish side of the event channel.
///
/// Once [`close`](Self::close)d, emits are dropped and every stream ends after
/// draining what it already buffered.
pub struct EventBus {
    sender: RwLock<Option<broadcast::Sender<ChatEvent>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: RwLock::new(Some(sender)),
        }
    }

    /// Send to all current subscribers. Returns how many received it.
    pub fn emit(&self, event: ChatEvent) -> usize {
        match self.sender.read().as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscribe(&self) -> EventStream {
        self.stream(None)
    }

    /// Stream that only yields events of the given kinds.
    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventStream {
        self.stream(Some(kinds.to_vec()))
    }

    fn stream(&self, filter: Option<Vec<EventKind>>) -> EventStream {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                // Already closed: hand out a receiver whose sender is gone
                let (_, receiver) = broadcast::channel(1);
                receiver
            }
        };
        EventStream { receiver, filter }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    pub fn close(&self) {
        self.sender.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

/// Subscription to the event bus. Dropping it unsubscribes.
pub struct EventStream {
    receiver: broadcast::Receiver<ChatEvent>,
    filter: Option<Vec<EventKind>>,
}

impl EventStream {
    fn wants(&self, event: &ChatEvent) -> bool {
        self.filter
            .as_ref()
            .map(|kinds| kinds.contains(&event.kind()))
            .unwrap_or(true)
    }

    /// Next matching event; `None` once the bus is closed and drained.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered matching event without waiting.
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every buffered matching event, oldest first.
    pub fn drain(&mut self) -> Vec<ChatEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
