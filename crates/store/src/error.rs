//! Store errors

use thiserror::Error;

/// Errors from the durable store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}
