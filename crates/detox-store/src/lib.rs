//! Persistence layer for detoxd
//!
//! Provides:
//! - Registry snapshot document and its JSON file store
//! - Audit log (append-only, SQLite)

mod audit;
mod json;
mod snapshot;
mod sqlite;
mod traits;

pub use audit::*;
pub use json::*;
pub use snapshot::*;
pub use sqlite::*;
pub use traits::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
