//! Storage module for persisting archived records
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Idempotent, transactional bulk upserts of record batches
//! - Full-text search over the record projection

mod schema;
mod sqlite;
mod traits;

pub use schema::{RECORDS_TABLE, SEARCH_TABLE};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::record::Record;
use std::path::Path;

/// Largest page size a search may request
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Longest raw query accepted by [`SearchQuery::new`], in characters
pub const MAX_QUERY_LENGTH: usize = 80;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// How search terms are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Every term must match
    #[default]
    All,

    /// Any term may match
    Any,
}

/// A normalized full-text query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: Vec<String>,
    pub mode: MatchMode,
    pub page: u32,
    pub limit: u32,
}

impl SearchQuery {
    /// Builds a query from raw user input
    ///
    /// The input is truncated to [`MAX_QUERY_LENGTH`] characters and split on
    /// whitespace; each term keeps only ASCII alphanumerics and empty terms are
    /// dropped. `page` is floored at 1 and `limit` is clamped to
    /// `1..=MAX_SEARCH_LIMIT`.
    pub fn new(raw: &str, mode: MatchMode, page: u32, limit: u32) -> Self {
        let truncated: String = raw.trim().chars().take(MAX_QUERY_LENGTH).collect();
        let terms = truncated
            .split_whitespace()
            .map(|term| {
                term.chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
            })
            .filter(|term| !term.is_empty())
            .collect();

        Self {
            terms,
            mode,
            page: page.max(1),
            limit: limit.clamp(1, MAX_SEARCH_LIMIT),
        }
    }

    /// Builds the FTS5 match expression, or None when there are no terms
    ///
    /// Terms are quoted so that words like `AND` or `NEAR` are matched
    /// literally instead of being read as operators.
    pub fn match_expression(&self) -> Option<String> {
        if self.terms.is_empty() {
            return None;
        }

        let joiner = match self.mode {
            MatchMode::All => " AND ",
            MatchMode::Any => " OR ",
        };

        Some(
            self.terms
                .iter()
                .map(|term| format!("\"{}\"", term))
                .collect::<Vec<_>>()
                .join(joiner),
        )
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub records: Vec<Record>,
    /// Number of matches across all pages
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_strips_symbols() {
        let query = SearchQuery::new("  secret; DROP--  'memo' ", MatchMode::All, 1, 10);
        assert_eq!(query.terms, vec!["secret", "DROP", "memo"]);
    }

    #[test]
    fn test_query_normalizes_pagination() {
        let query = SearchQuery::new("memo", MatchMode::All, 0, 0);
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 1);

        let query = SearchQuery::new("memo", MatchMode::All, 3, 5000);
        assert_eq!(query.limit, MAX_SEARCH_LIMIT);
        assert_eq!(query.offset(), 200);
    }

    #[test]
    fn test_query_is_truncated() {
        let raw = "a".repeat(200);
        let query = SearchQuery::new(&raw, MatchMode::All, 1, 10);
        assert_eq!(query.terms[0].len(), MAX_QUERY_LENGTH);
    }

    #[test]
    fn test_match_expression_modes() {
        let all = SearchQuery::new("private message", MatchMode::All, 1, 10);
        assert_eq!(
            all.match_expression().as_deref(),
            Some("\"private\" AND \"message\"")
        );

        let any = SearchQuery::new("private message", MatchMode::Any, 1, 10);
        assert_eq!(
            any.match_expression().as_deref(),
            Some("\"private\" OR \"message\"")
        );
    }

    #[test]
    fn test_empty_query_has_no_expression() {
        let query = SearchQuery::new(" ;; -- ", MatchMode::All, 1, 10);
        assert!(query.terms.is_empty());
        assert!(query.match_expression().is_none());
    }
}
