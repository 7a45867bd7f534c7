//! Error types for PearChat

use thiserror::Error;

/// Main error type for PearChat operations
#[derive(Error, Debug)]
pub enum ChatError {
    /// Generic shared store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// The shared store is not usable on this platform
    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(String),

    /// The redb file could not be created or opened
    #[error("Failed to open store database: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Store transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Store table unavailable: {0}")]
    Table(#[from] redb::TableError),

    /// Read or write inside an open table
    #[error("Store operation failed: {0}")]
    StorageOp(#[from] redb::StorageError),

    #[error("Store commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    /// A stored value could not be encoded or decoded as JSON
    #[error("JSON error: {0}")]
    Serialization(String),

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    Config(String),

    /// Filesystem access (config files, log directories)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}

/// Result type alias using ChatError
pub type ChatResult<T> = Result<T, ChatError>;
