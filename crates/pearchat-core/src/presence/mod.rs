//! Presence and message-sync loop
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  every heartbeat_interval                                       │
//! │  └── heartbeat: peers[self] = {id, lastSeen: now, room}         │
//! │                                                                 │
//! │  every scan_interval (and on a `peers` change)                  │
//! │  ├── LivenessScanner: live set diff -> connected/disconnected   │
//! │  └── gc: drop expired records (timer ticks only)                │
//! │                                                                 │
//! │  every poll_interval (and on a `messages` change)               │
//! │  └── MessagePoller: messages by others -> message-received      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pieces here are plain state machines over already-read tables. The
//! chat service owns them, reads the store, and publishes what they return.

pub mod gc;
pub mod heartbeat;
pub mod liveness;
pub mod poller;

pub use gc::collect_expired;
pub use heartbeat::heartbeat_record;
pub use liveness::{live_peers, LivenessScanner};
pub use poller::MessagePoller;
