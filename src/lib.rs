//! Archive Indexer: a resumable crawl-and-load pipeline
//!
//! This crate harvests a paginated public record listing, parses each row into a
//! [`Record`], and bulk-loads the records into SQLite together with a full-text
//! projection. Page progress is tracked per page and persisted as a JSON snapshot
//! so that an interrupted range can be inspected and resumed.

pub mod config;
pub mod console;
pub mod crawler;
pub mod indexer;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for indexer operations
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("An indexing job is already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for indexer operations
pub type Result<T> = std::result::Result<T, IndexerError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, PageSize};
pub use indexer::{JobReport, JobRequest, Orchestrator, StatusReport};
pub use record::{Record, RecordResult, RowError};
pub use state::{PageProgress, PageState, ProgressStore};
