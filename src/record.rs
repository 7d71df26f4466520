//! Archived record types
//!
//! A [`Record`] is built by the row parser, wrapped in a [`RecordResult`] and
//! moved through the record channel to the batch writer.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while parsing a single listing row
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("invalid record id '{value}'")]
    InvalidId { value: String },

    #[error("invalid timestamp '{value}': {message}")]
    InvalidTimestamp { value: String, message: String },

    #[error("row skipped: job cancelled")]
    Cancelled,
}

/// One archived item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub id: u32,
    pub sent_at: DateTime<Utc>,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
}

/// A parsed row together with the first error hit while parsing it
#[derive(Debug, Clone)]
pub struct RecordResult {
    pub record: Record,
    pub error: Option<RowError>,
}

impl RecordResult {
    pub fn ok(record: Record) -> Self {
        Self {
            record,
            error: None,
        }
    }

    pub fn failed(record: Record, error: RowError) -> Self {
        Self {
            record,
            error: Some(error),
        }
    }

    /// Returns true if the writer should store this record
    ///
    /// Rows with an error or without an identifier are discarded downstream.
    pub fn is_storable(&self) -> bool {
        self.error.is_none() && self.record.id > 0
    }

    /// Consumes the result, yielding the record only when it is storable
    pub fn into_storable(self) -> Option<Record> {
        if self.is_storable() {
            Some(self.record)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32) -> Record {
        Record {
            id,
            subject: "subject".to_string(),
            ..Record::default()
        }
    }

    #[test]
    fn test_ok_result_is_storable() {
        let result = RecordResult::ok(record(7));
        assert!(result.is_storable());
        assert_eq!(result.into_storable().map(|r| r.id), Some(7));
    }

    #[test]
    fn test_zero_id_is_discarded() {
        let result = RecordResult::ok(record(0));
        assert!(!result.is_storable());
        assert!(result.into_storable().is_none());
    }

    #[test]
    fn test_errored_row_is_discarded() {
        let result = RecordResult::failed(
            record(3),
            RowError::InvalidTimestamp {
                value: "yesterday".to_string(),
                message: "input contains invalid characters".to_string(),
            },
        );
        assert!(!result.is_storable());
    }

    #[test]
    fn test_row_error_display() {
        let err = RowError::InvalidId {
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "invalid record id 'abc'");
    }
}
