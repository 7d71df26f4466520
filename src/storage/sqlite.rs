//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::record::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{SearchPage, SearchQuery};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RECORD_COLUMNS: &str = "r.id, r.sent_at, r.subject, r.sender, r.recipient, r.body";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and ensures the schema exists
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        let mut storage = Self { conn };
        storage.ensure_schema()?;
        Ok(storage)
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.ensure_schema()?;
        Ok(storage)
    }
}

/// Maps a `records` row selected with [`RECORD_COLUMNS`]
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(Record, String)> {
    let record = Record {
        id: row.get(0)?,
        sent_at: DateTime::<Utc>::default(),
        subject: row.get(2)?,
        sender: row.get(3)?,
        recipient: row.get(4)?,
        body: row.get(5)?,
    };
    Ok((record, row.get(1)?))
}

/// Attaches the stored RFC 3339 timestamp to a mapped record
fn with_timestamp((mut record, sent_at): (Record, String)) -> StorageResult<Record> {
    record.sent_at = DateTime::parse_from_rfc3339(&sent_at)
        .map_err(|_| StorageError::InvalidTimestamp {
            id: record.id,
            value: sent_at.clone(),
        })?
        .with_timezone(&Utc);
    Ok(record)
}

impl Storage for SqliteStorage {
    // ===== Schema =====

    fn ensure_schema(&mut self) -> StorageResult<()> {
        initialize_schema(&self.conn)?;
        Ok(())
    }

    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ===== Writes =====

    fn bulk_upsert(&mut self, records: &[Record]) -> StorageResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        // Dropping the transaction without commit rolls both tables back
        let tx = self.conn.transaction()?;
        let mut inserted = 0u64;
        {
            let mut insert_record = tx.prepare_cached(
                "INSERT INTO records (id, sent_at, subject, sender, recipient, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO NOTHING",
            )?;
            let mut insert_search = tx.prepare_cached(
                "INSERT INTO records_search (rowid, subject, sender, recipient, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for record in records {
                let changed = insert_record.execute(params![
                    record.id,
                    record.sent_at.to_rfc3339(),
                    record.subject,
                    record.sender,
                    record.recipient,
                    record.body,
                ])?;

                // Only newly inserted ids get a search row
                if changed > 0 {
                    insert_search.execute(params![
                        record.id,
                        record.subject,
                        record.sender,
                        record.recipient,
                        record.body,
                    ])?;
                    inserted += changed as u64;
                }
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    // ===== Reads =====

    fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_record(&self, id: u32) -> StorageResult<Option<Record>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM records r WHERE r.id = ?1", RECORD_COLUMNS),
                params![id],
                record_from_row,
            )
            .optional()?;

        row.map(with_timestamp).transpose()
    }

    fn record_ids(&self) -> StorageResult<Vec<u32>> {
        let mut stmt = self.conn.prepare("SELECT id FROM records ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn search(&self, query: &SearchQuery) -> StorageResult<SearchPage> {
        let limit = i64::from(query.limit);
        let offset = query.offset() as i64;

        let (total, rows) = match query.match_expression() {
            Some(expression) => {
                let total: i64 = self.conn.query_row(
                    "SELECT COUNT(*) FROM records_search WHERE records_search MATCH ?1",
                    params![expression],
                    |row| row.get(0),
                )?;

                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM records_search
                     JOIN records r ON r.id = records_search.rowid
                     WHERE records_search MATCH ?1
                     ORDER BY bm25(records_search), r.id DESC
                     LIMIT ?2 OFFSET ?3",
                    RECORD_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![expression, limit, offset], record_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                (total, rows)
            }
            None => {
                let total: i64 =
                    self.conn
                        .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

                let mut stmt = self.conn.prepare(&format!(
                    "SELECT {} FROM records r
                     ORDER BY r.sent_at DESC, r.id DESC
                     LIMIT ?1 OFFSET ?2",
                    RECORD_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![limit, offset], record_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                (total, rows)
            }
        };

        let records = rows
            .into_iter()
            .map(with_timestamp)
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(SearchPage {
            records,
            total: total as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MatchMode, RECORDS_TABLE, SEARCH_TABLE};
    use chrono::TimeZone;

    fn record(id: u32, subject: &str) -> Record {
        Record {
            id,
            sent_at: Utc.with_ymd_and_hms(2010, 3, 4, 12, 30, 0).unwrap(),
            subject: subject.to_string(),
            sender: "H <h@example.com>".to_string(),
            recipient: "B <b@example.com>".to_string(),
            body: format!("{} content", subject),
        }
    }

    fn search_count(storage: &SqliteStorage) -> i64 {
        storage
            .conn
            .query_row("SELECT COUNT(*) FROM records_search", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_table_exists() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.table_exists(RECORDS_TABLE).unwrap());
        assert!(storage.table_exists(SEARCH_TABLE).unwrap());
        assert!(!storage.table_exists("emails").unwrap());
    }

    #[test]
    fn test_empty_batch() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert_eq!(storage.bulk_upsert(&[]).unwrap(), 0);
        assert_eq!(storage.count_records().unwrap(), 0);
    }

    #[test]
    fn test_bulk_upsert_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        assert_eq!(storage.bulk_upsert(&[record(1, "first")]).unwrap(), 1);
        let inserted = storage
            .bulk_upsert(&[record(1, "first"), record(2, "second")])
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(storage.count_records().unwrap(), 2);
        assert_eq!(search_count(&storage), 2);
    }

    #[test]
    fn test_duplicates_inside_batch_are_skipped() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.bulk_upsert(&[record(1, "testing")]).unwrap();

        let batch = [
            record(2, "secret"),
            record(3, "private"),
            record(3, "private"),
            record(4, "confidential"),
        ];
        assert_eq!(storage.bulk_upsert(&batch).unwrap(), 3);
        assert_eq!(storage.count_records().unwrap(), 4);
        assert_eq!(search_count(&storage), 4);
    }

    #[test]
    fn test_conflicting_id_is_not_overwritten() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.bulk_upsert(&[record(5, "original")]).unwrap();
        storage.bulk_upsert(&[record(5, "replacement")]).unwrap();

        let stored = storage.get_record(5).unwrap().unwrap();
        assert_eq!(stored.subject, "original");
    }

    #[test]
    fn test_get_record_roundtrip() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let original = record(42, "roundtrip");
        storage.bulk_upsert(&[original.clone()]).unwrap();

        assert_eq!(storage.get_record(42).unwrap(), Some(original));
        assert_eq!(storage.get_record(43).unwrap(), None);
    }

    #[test]
    fn test_failed_projection_rolls_back_batch() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();

        // Swap the projection for a table that rejects one subject
        storage
            .conn
            .execute_batch(
                "DROP TABLE records_search;
                 CREATE TABLE records_search (
                     rowid INTEGER PRIMARY KEY,
                     subject TEXT CHECK (subject <> 'poison'),
                     sender TEXT,
                     recipient TEXT,
                     body TEXT
                 );",
            )
            .unwrap();

        let result = storage.bulk_upsert(&[record(1, "fine"), record(2, "poison")]);
        assert!(result.is_err());
        assert_eq!(storage.count_records().unwrap(), 0);
    }

    #[test]
    fn test_record_ids_sorted() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .bulk_upsert(&[record(9, "c"), record(2, "a"), record(5, "b")])
            .unwrap();
        assert_eq!(storage.record_ids().unwrap(), vec![2, 5, 9]);
    }

    #[test]
    fn test_search_all_terms() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .bulk_upsert(&[
                record(1, "secret message"),
                record(2, "private message"),
                record(3, "confidential memo"),
            ])
            .unwrap();

        let page = storage
            .search(&SearchQuery::new("private message", MatchMode::All, 1, 10))
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].id, 2);
    }

    #[test]
    fn test_search_any_term() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .bulk_upsert(&[
                record(1, "secret message"),
                record(2, "private message"),
                record(3, "confidential memo"),
            ])
            .unwrap();

        let page = storage
            .search(&SearchQuery::new("secret memo", MatchMode::Any, 1, 10))
            .unwrap();
        assert_eq!(page.total, 2);
        let mut ids: Vec<u32> = page.records.iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_search_without_terms_lists_newest_first() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let mut older = record(1, "older");
        older.sent_at = Utc.with_ymd_and_hms(2009, 1, 1, 0, 0, 0).unwrap();
        storage
            .bulk_upsert(&[older, record(2, "newer"), record(3, "newest")])
            .unwrap();

        let page = storage
            .search(&SearchQuery::new("", MatchMode::All, 1, 2))
            .unwrap();
        assert_eq!(page.total, 3);
        let ids: Vec<u32> = page.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let second = storage
            .search(&SearchQuery::new("", MatchMode::All, 2, 2))
            .unwrap();
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].id, 1);
    }

    #[test]
    fn test_search_operator_words_are_literal() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.bulk_upsert(&[record(1, "near and far")]).unwrap();

        let page = storage
            .search(&SearchQuery::new("NEAR AND", MatchMode::All, 1, 10))
            .unwrap();
        assert_eq!(page.total, 1);
    }
}
