//! Configuration module for the archive indexer
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use archive_indexer::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Default page size: {}", config.indexer.page_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, IndexerConfig, OutputConfig, ScraperConfig, DEFAULT_BATCH_SIZE, DEFAULT_DELAY_MS,
    DEFAULT_PAGE_SIZE, DEFAULT_PARALLELISM, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_ROW_CONCURRENCY, DEFAULT_UPDATE_INTERVAL,
};

// Re-export parser functions
pub use parser::{load_config, parse_config};
