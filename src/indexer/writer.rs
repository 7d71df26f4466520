//! Batch writer
//!
//! Drains the record channel into fixed-size batches and hands each batch to
//! [`Storage::bulk_upsert`]. A flush is one storage transaction, so a batch is
//! either stored completely or not at all.

use crate::record::{Record, RecordResult};
use crate::storage::{Storage, StorageError, StorageResult};
use crate::Result;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Live writer counters, shared with status readers
#[derive(Debug, Default)]
pub struct WriterStats {
    received: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    discarded: AtomicU64,
    failed_batches: AtomicU64,
    failed_records: AtomicU64,
}

/// Point-in-time copy of [`WriterStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterCounts {
    /// Results read from the channel
    pub received: u64,
    /// Records newly stored
    pub inserted: u64,
    /// Records skipped because their identifier already existed
    pub duplicates: u64,
    /// Results dropped for a row error or a zero identifier
    pub discarded: u64,
    /// Batches whose transaction failed
    pub failed_batches: u64,
    /// Records lost with failed batches
    pub failed_records: u64,
}

impl WriterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WriterCounts {
        WriterCounts {
            received: self.received.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            failed_records: self.failed_records.load(Ordering::Relaxed),
        }
    }
}

/// Consumes record results and stores them in batches
pub struct BatchWriter<S> {
    storage: Arc<Mutex<S>>,
    batch_size: usize,
    stats: Arc<WriterStats>,
}

impl<S> BatchWriter<S>
where
    S: Storage + Send + 'static,
{
    /// Creates a writer; `batch_size` is floored at 1
    pub fn new(storage: Arc<Mutex<S>>, batch_size: usize) -> Self {
        Self::with_stats(storage, batch_size, Arc::new(WriterStats::new()))
    }

    pub fn with_stats(storage: Arc<Mutex<S>>, batch_size: usize, stats: Arc<WriterStats>) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
            stats,
        }
    }

    pub fn stats(&self) -> Arc<WriterStats> {
        self.stats.clone()
    }

    /// Drains `input` until every sender is dropped
    ///
    /// Full batches are flushed as they fill; a failed flush is logged,
    /// counted and dropped. The remainder is flushed once the channel closes,
    /// and only that last flush's error is returned.
    pub async fn drain(&self, mut input: mpsc::Receiver<RecordResult>) -> Result<WriterCounts> {
        let mut batch: Vec<Record> = Vec::with_capacity(self.batch_size);

        while let Some(result) = input.recv().await {
            self.stats.received.fetch_add(1, Ordering::Relaxed);

            let Some(record) = result.into_storable() else {
                self.stats.discarded.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            batch.push(record);

            if batch.len() >= self.batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                if let Err(e) = self.flush(full).await {
                    tracing::error!(error = %e, "Failed to store batch; dropping it");
                }
            }
        }

        if !batch.is_empty() {
            self.flush(batch).await?;
        }

        let counts = self.stats.snapshot();
        tracing::info!(
            inserted = counts.inserted,
            duplicates = counts.duplicates,
            discarded = counts.discarded,
            failed_batches = counts.failed_batches,
            "Record stream drained"
        );
        Ok(counts)
    }

    /// Stores one batch on the blocking pool and updates the counters
    async fn flush(&self, batch: Vec<Record>) -> StorageResult<u64> {
        let size = batch.len() as u64;
        let storage = self.storage.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut storage = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
            storage.bulk_upsert(&batch)
        })
        .await
        .unwrap_or_else(|e| Err(StorageError::Database(format!("flush task failed: {}", e))));

        match outcome {
            Ok(inserted) => {
                self.stats.inserted.fetch_add(inserted, Ordering::Relaxed);
                self.stats
                    .duplicates
                    .fetch_add(size.saturating_sub(inserted), Ordering::Relaxed);
                tracing::debug!(size, inserted, "Flushed batch");
                Ok(inserted)
            }
            Err(e) => {
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                self.stats.failed_records.fetch_add(size, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RowError;
    use crate::storage::{SearchPage, SearchQuery, SqliteStorage};
    use chrono::{TimeZone, Utc};

    /// Storage double that records the ids of every batch it receives
    #[derive(Default)]
    struct RecordingStorage {
        batches: Vec<Vec<u32>>,
        fail_batches: Vec<usize>,
    }

    impl Storage for RecordingStorage {
        fn ensure_schema(&mut self) -> StorageResult<()> {
            Ok(())
        }

        fn table_exists(&self, _name: &str) -> StorageResult<bool> {
            Ok(true)
        }

        fn bulk_upsert(&mut self, records: &[Record]) -> StorageResult<u64> {
            let index = self.batches.len();
            self.batches.push(records.iter().map(|r| r.id).collect());
            if self.fail_batches.contains(&index) {
                return Err(StorageError::Database("injected failure".to_string()));
            }
            Ok(records.len() as u64)
        }

        fn count_records(&self) -> StorageResult<u64> {
            Ok(self.batches.iter().map(|b| b.len() as u64).sum())
        }

        fn get_record(&self, _id: u32) -> StorageResult<Option<Record>> {
            Ok(None)
        }

        fn record_ids(&self) -> StorageResult<Vec<u32>> {
            Ok(self.batches.concat())
        }

        fn search(&self, _query: &SearchQuery) -> StorageResult<SearchPage> {
            Ok(SearchPage::default())
        }
    }

    fn record(id: u32) -> Record {
        Record {
            id,
            sent_at: Utc.with_ymd_and_hms(2010, 3, 4, 12, 30, 0).unwrap(),
            subject: format!("subject {}", id),
            ..Record::default()
        }
    }

    async fn run<S: Storage + Send + 'static>(
        storage: Arc<Mutex<S>>,
        batch_size: usize,
        results: Vec<RecordResult>,
    ) -> Result<WriterCounts> {
        let writer = BatchWriter::new(storage, batch_size);
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(async move {
            for result in results {
                tx.send(result).await.unwrap();
            }
        });
        let counts = writer.drain(rx).await;
        producer.await.unwrap();
        counts
    }

    #[tokio::test]
    async fn test_flushes_in_batch_groups() {
        let storage = Arc::new(Mutex::new(RecordingStorage::default()));
        let results = (1..=5).map(|id| RecordResult::ok(record(id))).collect();

        let counts = run(storage.clone(), 2, results).await.unwrap();

        let batches = storage.lock().unwrap().batches.clone();
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(counts.inserted, 5);
        assert_eq!(counts.received, 5);
    }

    #[tokio::test]
    async fn test_discards_errors_and_zero_ids() {
        let storage = Arc::new(Mutex::new(RecordingStorage::default()));
        let results = vec![
            RecordResult::ok(record(1)),
            RecordResult::ok(record(0)),
            RecordResult::failed(
                record(2),
                RowError::InvalidId {
                    value: "x".to_string(),
                },
            ),
            RecordResult::ok(record(3)),
        ];

        let counts = run(storage.clone(), 10, results).await.unwrap();

        assert_eq!(storage.lock().unwrap().batches, vec![vec![1, 3]]);
        assert_eq!(counts.discarded, 2);
        assert_eq!(counts.inserted, 2);
    }

    #[tokio::test]
    async fn test_empty_stream_never_flushes() {
        let storage = Arc::new(Mutex::new(RecordingStorage::default()));
        let counts = run(storage.clone(), 3, Vec::new()).await.unwrap();

        assert!(storage.lock().unwrap().batches.is_empty());
        assert_eq!(counts, WriterCounts::default());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_is_counted_not_returned() {
        let storage = Arc::new(Mutex::new(RecordingStorage {
            fail_batches: vec![0],
            ..RecordingStorage::default()
        }));
        let results = (1..=3).map(|id| RecordResult::ok(record(id))).collect();

        let counts = run(storage.clone(), 2, results).await.unwrap();

        assert_eq!(counts.failed_batches, 1);
        assert_eq!(counts.failed_records, 2);
        assert_eq!(counts.inserted, 1);
    }

    #[tokio::test]
    async fn test_final_flush_failure_is_returned() {
        let storage = Arc::new(Mutex::new(RecordingStorage {
            fail_batches: vec![1],
            ..RecordingStorage::default()
        }));
        let results = (1..=3).map(|id| RecordResult::ok(record(id))).collect();

        let result = run(storage, 2, results).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_batch_size_floored_at_one() {
        let storage = Arc::new(Mutex::new(RecordingStorage::default()));
        let results = (1..=2).map(|id| RecordResult::ok(record(id))).collect();

        run(storage.clone(), 0, results).await.unwrap();
        assert_eq!(storage.lock().unwrap().batches, vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_final_state_independent_of_order() {
        let ids = [4, 1, 7, 3, 9, 2, 8, 5, 6];
        let mut reversed = ids;
        reversed.reverse();

        let mut stored = Vec::new();
        for order in [ids, reversed] {
            let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
            let mut results: Vec<RecordResult> =
                order.iter().map(|&id| RecordResult::ok(record(id))).collect();
            // A replayed record must not change the outcome
            results.push(RecordResult::ok(record(order[0])));

            let counts = run(storage.clone(), 4, results).await.unwrap();
            assert_eq!(counts.inserted, 9);
            assert_eq!(counts.duplicates, 1);

            let guard = storage.lock().unwrap();
            stored.push(guard.record_ids().unwrap());
        }

        assert_eq!(stored[0], stored[1]);
        assert_eq!(stored[0], (1..=9).collect::<Vec<u32>>());
    }
}
