//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::record::Record;
use crate::storage::{SearchPage, SearchQuery};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid stored timestamp for record {id}: {value}")]
    InvalidTimestamp { id: u32, value: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The batch writer only needs [`Storage::bulk_upsert`]; the remaining
/// operations serve startup checks, status output and record search.
pub trait Storage {
    // ===== Schema =====

    /// Creates the record and search tables if they do not exist
    fn ensure_schema(&mut self) -> StorageResult<()>;

    /// Checks whether a table with the given name exists
    fn table_exists(&self, name: &str) -> StorageResult<bool>;

    // ===== Writes =====

    /// Inserts a batch of records and their search projection atomically
    ///
    /// Records whose identifier already exists are skipped, never overwritten,
    /// so replaying a batch is safe.
    ///
    /// # Returns
    ///
    /// The number of records actually inserted
    fn bulk_upsert(&mut self, records: &[Record]) -> StorageResult<u64>;

    // ===== Reads =====

    /// Counts stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Gets a record by identifier
    fn get_record(&self, id: u32) -> StorageResult<Option<Record>>;

    /// Lists every stored identifier in ascending order
    fn record_ids(&self) -> StorageResult<Vec<u32>>;

    /// Runs a paginated full-text query
    fn search(&self, query: &SearchQuery) -> StorageResult<SearchPage>;
}
