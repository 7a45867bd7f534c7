//! Chat messages and consumer-side history
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Chat Layer (this module)                                       │
//! │  - Message: append-only record in a room's log                  │
//! │  - Conversation: dedup-by-id history for display                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Presence Layer (presence module)                               │
//! │  - MessagePoller: surfaces fresh messages by other authors      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Shared Store (storage module)                                  │
//! │  - `pearchat-p2p-network`: room id -> [Message]                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod conversation;
mod message;

pub use conversation::Conversation;
pub use message::{Message, MessageKind};
