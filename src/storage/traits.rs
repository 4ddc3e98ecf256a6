//! Storage traits and error types
//!
//! This module defines the persistence boundary the crawl core writes
//! through, and the errors storage backends report.

use crate::fetcher::NodeRecord;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination for fetched node records
///
/// `upsert` must be idempotent per node id: writing the same id twice keeps
/// one row holding the latest attributes. Implementations are shared across
/// workers and must be thread-safe.
pub trait NodeSink: Send + Sync {
    /// Inserts or replaces a node and records its edges
    fn upsert(&self, record: NodeRecord) -> StorageResult<()>;
}
