//! Per-participant JSONL logs
//!
//! When several participants run side by side (the `simulate` command, or a
//! few terminals on one data directory) each one can write its own log file:
//!
//! ```text
//! <log-dir>/
//! └── raw/
//!     ├── 2026-10-17_alice.jsonl
//!     └── 2026-10-17_bot-1.jsonl
//! ```
//!
//! One JSON object per line, so files can be merged and sorted afterwards:
//!
//! ```bash
//! cat logs/raw/*.jsonl | jq -s 'sort_by(.ts)'
//! jq 'select(.fields.room_id == "lobby")' logs/raw/*.jsonl
//! ```

pub mod entry;
pub mod layer;
pub mod writer;

pub use entry::LogEntry;
pub use layer::JsonlLayer;
pub use writer::{read_entries, ParticipantLogWriter};
