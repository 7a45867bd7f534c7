//! Shared key-value storage
//!
//! All participants that should see each other point at the same
//! [`SharedStore`]. The store only knows string keys and string values; the
//! `peers` and `messages` tables are layered on top by [`PresenceTables`].
//!
//! Backends:
//! - [`MemoryStore`]: in-process map, clones share state
//! - [`RedbStore`]: persistent redb file, clones share one database handle
//! - [`UnavailableStore`]: every call fails (platform without storage)
//!
//! Every successful write publishes a [`StoreChange`] so observers can react
//! before their next polling tick.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::{ChatError, ChatResult};

mod redb_store;
mod tables;

pub use redb_store::RedbStore;
pub use tables::{PresenceTables, DEFAULT_MESSAGES_KEY, DEFAULT_PEERS_KEY};

/// Capacity of the change notification channel
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Notification that a key was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
}

impl StoreChange {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// A key-value store observable by every local participant.
///
/// No partial update primitive is assumed: callers read a whole value,
/// change it, and write the whole value back.
pub trait SharedStore: Send + Sync {
    /// Read a key. `Ok(None)` if the key was never written.
    fn get(&self, key: &str) -> ChatResult<Option<String>>;

    /// Replace the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> ChatResult<()>;

    /// Delete `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> ChatResult<()>;

    /// Receive a [`StoreChange`] after every successful write.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// In-process shared store.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemoryStore {
    fn get(&self, key: &str) -> ChatResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> ChatResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        let _ = self.changes.send(StoreChange::new(key));
        Ok(())
    }

    fn remove(&self, key: &str) -> ChatResult<()> {
        if self.entries.write().remove(key).is_some() {
            let _ = self.changes.send(StoreChange::new(key));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// Store for platforms without any shared storage.
///
/// Reads and writes fail with [`ChatError::StoreUnavailable`]; the presence
/// loop degrades that to "nothing happened".
pub struct UnavailableStore {
    reason: String,
    changes: broadcast::Sender<StoreChange>,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        let (changes, _) = broadcast::channel(1);
        Self {
            reason: reason.into(),
            changes,
        }
    }

    fn unavailable<T>(&self) -> ChatResult<T> {
        Err(ChatError::StoreUnavailable(self.reason.clone()))
    }
}

impl SharedStore for UnavailableStore {
    fn get(&self, _key: &str) -> ChatResult<Option<String>> {
        self.unavailable()
    }

    fn set(&self, _key: &str, _value: &str) -> ChatResult<()> {
        self.unavailable()
    }

    fn remove(&self, _key: &str) -> ChatResult<()> {
        self.unavailable()
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
