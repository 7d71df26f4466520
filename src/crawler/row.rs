//! Column parsing for a single listing row

use crate::crawler::parser::ListingCell;
use crate::crawler::sanitize::Sanitizer;
use crate::record::{Record, RecordResult, RowError};
use chrono::{NaiveDateTime, TimeZone, Utc};

/// Timestamp layout of the date column, interpreted as UTC
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Index of the last column carrying record data
const LAST_COLUMN: usize = 4;

/// Outcome of parsing the columns of one row
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub record: Record,
    pub error: Option<RowError>,

    /// True when every column up to the recipient was parsed
    pub complete: bool,
}

impl ParsedRow {
    /// Returns true if the detail page should be fetched for this row
    pub fn wants_content(&self) -> bool {
        self.complete && self.error.is_none() && self.record.id > 0
    }

    pub fn into_result(self) -> RecordResult {
        RecordResult {
            record: self.record,
            error: self.error,
        }
    }
}

/// Parses the columns of a listing row in order
///
/// Columns are id, timestamp, subject, sender and recipient. Parsing stops at
/// the first failing column; fields parsed before the failure are kept.
pub fn parse_row(cells: &[ListingCell], sanitizer: &dyn Sanitizer) -> ParsedRow {
    let mut record = Record::default();

    for (index, cell) in cells.iter().enumerate() {
        if let Err(error) = parse_column(index, cell, &mut record, sanitizer) {
            tracing::error!(id = record.id, column = index, error = %error, "Failed to parse row");
            return ParsedRow {
                record,
                error: Some(error),
                complete: false,
            };
        }
    }

    ParsedRow {
        record,
        error: None,
        complete: cells.len() > LAST_COLUMN,
    }
}

fn parse_column(
    index: usize,
    cell: &ListingCell,
    record: &mut Record,
    sanitizer: &dyn Sanitizer,
) -> Result<(), RowError> {
    match index {
        0 => {
            record.id = cell.text.parse::<u32>().map_err(|_| RowError::InvalidId {
                value: cell.text.clone(),
            })?;
        }
        1 => {
            let naive = NaiveDateTime::parse_from_str(&cell.text, TIMESTAMP_FORMAT).map_err(
                |e| RowError::InvalidTimestamp {
                    value: cell.text.clone(),
                    message: e.to_string(),
                },
            )?;
            record.sent_at = Utc.from_utc_datetime(&naive);
        }
        2 => record.subject = sanitizer.sanitize(&cell.text),
        3 => record.sender = sanitizer.sanitize(&cell.text),
        4 => record.recipient = sanitizer.sanitize(&cell.text),
        other => tracing::warn!(column = other, "Unknown listing column"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::parser::parse_listing;
    use crate::crawler::sanitize::{HtmlSanitizer, PassthroughSanitizer};
    use chrono::{Datelike, Timelike};

    fn cells(values: &[&str]) -> Vec<ListingCell> {
        values
            .iter()
            .map(|value| ListingCell::new(*value))
            .collect()
    }

    #[test]
    fn test_full_row() {
        let row = parse_row(
            &cells(&["1001", "2010-03-04 12:30", "Budget", "H", "Staff"]),
            &PassthroughSanitizer,
        );

        assert!(row.error.is_none());
        assert!(row.complete);
        assert!(row.wants_content());
        assert_eq!(row.record.id, 1001);
        assert_eq!(row.record.sent_at.year(), 2010);
        assert_eq!(row.record.sent_at.hour(), 12);
        assert_eq!(row.record.sent_at.minute(), 30);
        assert_eq!(row.record.subject, "Budget");
        assert_eq!(row.record.recipient, "Staff");
    }

    #[test]
    fn test_bad_date_stops_parsing() {
        let row = parse_row(
            &cells(&["1002", "yesterday", "Budget", "H", "Staff"]),
            &PassthroughSanitizer,
        );

        assert!(matches!(
            row.error,
            Some(RowError::InvalidTimestamp { ref value, .. }) if value == "yesterday"
        ));
        assert_eq!(row.record.id, 1002);
        assert!(row.record.subject.is_empty());
        assert!(!row.wants_content());
    }

    #[test]
    fn test_bad_id() {
        let row = parse_row(&cells(&["abc", "2010-03-04 12:30"]), &PassthroughSanitizer);
        assert!(matches!(row.error, Some(RowError::InvalidId { .. })));
        assert_eq!(row.record.id, 0);
    }

    #[test]
    fn test_short_row_skips_content() {
        let row = parse_row(&cells(&["7", "2010-03-04 12:30", "s"]), &PassthroughSanitizer);
        assert!(row.error.is_none());
        assert!(!row.complete);
        assert!(!row.wants_content());
    }

    #[test]
    fn test_zero_id_skips_content() {
        let row = parse_row(
            &cells(&["0", "2010-03-04 12:30", "s", "f", "t"]),
            &PassthroughSanitizer,
        );
        assert!(row.error.is_none());
        assert!(!row.wants_content());
        assert!(!row.into_result().is_storable());
    }

    #[test]
    fn test_text_fields_sanitized() {
        let mut row_cells = cells(&["9", "2010-03-04 12:30", "", "f", "t"]);
        row_cells[2] = ListingCell::new("Hi<script>x()</script>");
        let row = parse_row(&row_cells, &HtmlSanitizer);
        assert_eq!(row.record.subject, "Hi");
    }

    #[test]
    fn test_linked_cells_store_plain_text() {
        let html = r#"<table class="table search-result"><tbody><tr>
            <td>1001</td>
            <td>2010-03-04 12:30</td>
            <td><a href="/emailid/1001">Budget &amp; plan</a></td>
            <td><a href="?mfrom=H">H</a></td>
            <td><a href="?mto=Staff">Staff</a></td>
        </tr></tbody></table>"#;
        let rows = parse_listing(html).unwrap();

        let row = parse_row(&rows[0], &HtmlSanitizer);

        assert!(row.error.is_none());
        assert_eq!(row.record.subject, "Budget &amp; plan");
        assert_eq!(row.record.sender, "H");
        assert_eq!(row.record.recipient, "Staff");
        assert!(!row.record.subject.contains("href"));
    }
}
