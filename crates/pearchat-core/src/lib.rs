//! PearChat Core Library
//!
//! Presence heartbeats and message sync between chat participants that share
//! one key-value store.
//!
//! ## Overview
//!
//! Every participant periodically writes a heartbeat record into a shared
//! `peers` table and appends its messages to a shared per-room log. Each
//! participant scans the table to decide which peers are live and polls the
//! log of its current room for messages by others. There is no networking:
//! whoever can see the store can see the chat.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pearchat_core::{ChatConfig, ChatService, MemoryStore, SystemClock, TokioScheduler};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let scheduler = Arc::new(TokioScheduler::current().unwrap());
//!
//!     let alice = ChatService::new(store.clone(), scheduler.clone(), Arc::new(SystemClock), ChatConfig::default());
//!     let bob = ChatService::new(store, scheduler, Arc::new(SystemClock), ChatConfig::default());
//!
//!     let mut events = bob.subscribe();
//!     alice.join_room("lobby");
//!     bob.join_room("lobby");
//!     alice.send_message("lobby", "hi bob");
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{}", event);
//!     }
//! }
//! ```

pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod presence;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod types;

// Re-exports
pub use chat::{Conversation, Message, MessageKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ChatConfig, DeliveryMode};
pub use error::{ChatError, ChatResult};
pub use events::{ChatEvent, EventBus, EventKind, EventStream};
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, TokioScheduler};
pub use service::{ChatService, RoomJoin};
pub use storage::{MemoryStore, PresenceTables, RedbStore, SharedStore, StoreChange, UnavailableStore};
pub use types::*;
