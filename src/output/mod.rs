//! Output module for operator-facing text
//!
//! This module handles:
//! - Rendering page progress and writer counters
//! - Rendering job outcomes and search results
//! - Loading archive statistics from storage

pub mod stats;

pub use stats::{
    format_job_report, format_search_page, format_statistics, format_status, load_statistics,
    ArchiveStatistics,
};
