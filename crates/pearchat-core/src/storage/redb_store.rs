//! Persistent shared store on redb.
//!
//! A redb file can only be opened by one process at a time, so sharing
//! happens between participants in the same process: clone the store and
//! hand a copy to each service.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tokio::sync::broadcast;

use super::{SharedStore, StoreChange, CHANGE_CHANNEL_CAPACITY};
use crate::error::ChatResult;

const SHARED_KV_TABLE: TableDefinition<&str, &str> = TableDefinition::new("shared_kv");

/// Shared store persisted in a redb database.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
    changes: broadcast::Sender<StoreChange>,
}

impl RedbStore {
    /// Open or create the store at `path`.
    ///
    /// Creates the parent directory and the key-value table if needed.
    pub fn new(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SHARED_KV_TABLE)?;
        }
        write_txn.commit()?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            db: Arc::new(db),
            changes,
        })
    }

    fn notify(&self, key: &str) {
        let _ = self.changes.send(StoreChange::new(key));
    }
}

impl SharedStore for RedbStore {
    fn get(&self, key: &str) -> ChatResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARED_KV_TABLE)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    fn set(&self, key: &str, value: &str) -> ChatResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SHARED_KV_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        self.notify(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> ChatResult<()> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SHARED_KV_TABLE)?;
            let removed = table.remove(key)?.is_some();
            removed
        };
        write_txn.commit()?;
        if removed {
            self.notify(key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
