//! Job orchestration
//!
//! The orchestrator accepts one range job at a time, seeds its pages as
//! pending, and wires the crawler to the batch writer and the progress
//! updater through two bounded channels.

use crate::config::IndexerConfig;
use crate::crawler::{validate_range, Crawler, PageSize};
use crate::indexer::writer::{BatchWriter, WriterCounts, WriterStats};
use crate::record::RecordResult;
use crate::state::{PageProgress, PageState, ProgressSnapshot, ProgressStore, SnapshotFile};
use crate::storage::Storage;
use crate::{IndexerError, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the record and page channels
///
/// One slot keeps producers in lockstep with their consumers.
const CHANNEL_CAPACITY: usize = 1;

/// A range job with optional per-job overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRequest {
    pub from: u32,
    pub to: u32,
    pub page_size: Option<u32>,
    pub batch_size: Option<usize>,
    pub update_interval: Option<u32>,
}

impl JobRequest {
    pub fn new(from: u32, to: u32) -> Self {
        Self {
            from,
            to,
            page_size: None,
            batch_size: None,
            update_interval: None,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_update_interval(mut self, update_interval: u32) -> Self {
        self.update_interval = Some(update_interval);
        self
    }
}

/// Outcome of a completed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// First page of the clamped range
    pub from: u32,
    /// Last page of the clamped range
    pub to: u32,
    pub page_size: u32,
    /// Pages that reached `Finished`
    pub pages_finished: usize,
    pub writer: WriterCounts,
    pub cancelled: bool,
}

/// Handle to a running job
pub struct JobHandle {
    from: u32,
    to: u32,
    cancel: CancellationToken,
    task: JoinHandle<Result<JobReport>>,
}

impl JobHandle {
    /// The clamped page range actually scheduled
    pub fn range(&self) -> (u32, u32) {
        (self.from, self.to)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the crawler, writer and updater to finish
    pub async fn wait(self) -> Result<JobReport> {
        self.task.await?
    }
}

/// Point-in-time view of page progress and the writer
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// Every known page, ordered by page number
    pub pages: Vec<PageProgress>,
    pub pending: usize,
    pub processing: usize,
    pub finished: usize,
    /// Pages carrying an error annotation
    pub errored: usize,
    pub running: bool,
    pub writer: WriterCounts,
}

impl StatusReport {
    pub fn from_snapshot(snapshot: ProgressSnapshot, running: bool, writer: WriterCounts) -> Self {
        let mut report = StatusReport {
            running,
            writer,
            ..StatusReport::default()
        };

        for progress in snapshot.into_values() {
            match progress.state {
                PageState::Pending => report.pending += 1,
                PageState::Processing => report.processing += 1,
                PageState::Finished => report.finished += 1,
            }
            if progress.has_error() {
                report.errored += 1;
            }
            report.pages.push(progress);
        }

        report
    }

    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    /// Sum of the row totals of every page
    pub fn total_rows(&self) -> u64 {
        self.pages.iter().map(|p| u64::from(p.total)).sum()
    }
}

/// Releases the running flag when dropped
struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Runs range jobs against a crawler, a storage backend and a progress file
pub struct Orchestrator<S> {
    crawler: Crawler,
    storage: Arc<Mutex<S>>,
    progress: Arc<ProgressStore>,
    snapshot: Arc<SnapshotFile>,
    defaults: IndexerConfig,
    running: Arc<AtomicBool>,
    last_page: Mutex<Option<(PageSize, u32)>>,
    cancel: Mutex<CancellationToken>,
    stats: Mutex<Arc<WriterStats>>,
}

impl<S> Orchestrator<S>
where
    S: Storage + Send + 'static,
{
    pub fn new(
        crawler: Crawler,
        storage: Arc<Mutex<S>>,
        snapshot: SnapshotFile,
        defaults: IndexerConfig,
    ) -> Self {
        Self {
            crawler,
            storage,
            progress: Arc::new(ProgressStore::new()),
            snapshot: Arc::new(snapshot),
            defaults,
            running: Arc::new(AtomicBool::new(false)),
            last_page: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
            stats: Mutex::new(Arc::new(WriterStats::new())),
        }
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn storage(&self) -> Arc<Mutex<S>> {
        self.storage.clone()
    }

    pub fn defaults(&self) -> &IndexerConfig {
        &self.defaults
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Loads the stored snapshot into the in-memory progress map
    ///
    /// # Returns
    ///
    /// The number of pages restored
    pub fn restore(&self) -> usize {
        let snapshot = self.snapshot.load();
        let pages = snapshot.len();
        self.progress.load(snapshot);
        pages
    }

    /// Probes the remote source for its last page at the default page size
    ///
    /// Failure leaves the orchestrator without a clamp.
    pub async fn discover_last_page(&self) -> Option<u32> {
        let page_size = match PageSize::try_from(self.defaults.page_size) {
            Ok(page_size) => page_size,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot probe last page");
                return None;
            }
        };

        match self.crawler.last_page(page_size.as_u32()).await {
            Ok(last) => {
                tracing::info!(last_page = last, page_size = %page_size, "Discovered last page");
                self.set_last_page(page_size, last);
                Some(last)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to discover last page; ranges will not be clamped");
                None
            }
        }
    }

    /// Sets the clamp used for jobs running at `page_size`
    pub fn set_last_page(&self, page_size: PageSize, last: u32) {
        *self.last_page.lock().unwrap_or_else(PoisonError::into_inner) = Some((page_size, last));
    }

    /// Returns the last page known for `page_size`
    pub fn last_page(&self, page_size: PageSize) -> Option<u32> {
        self.last_page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .filter(|(size, _)| *size == page_size)
            .map(|(_, last)| last)
    }

    /// Starts a range job
    ///
    /// The job runs in the background; the returned handle reports its
    /// outcome. Pages in the clamped range are reset to `Pending` and the
    /// seeded snapshot is written before any request is made.
    ///
    /// # Errors
    ///
    /// * `AlreadyRunning` - Another job has not finished yet
    /// * `InvalidParameter` - Bad page size or range; nothing was changed
    pub fn start_job(&self, request: JobRequest) -> Result<JobHandle> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexerError::AlreadyRunning);
        }
        let guard = RunningGuard {
            flag: self.running.clone(),
        };

        let page_size = PageSize::try_from(request.page_size.unwrap_or(self.defaults.page_size))?;
        let batch_size = request
            .batch_size
            .unwrap_or(self.defaults.batch_size)
            .max(1);
        let update_interval = request
            .update_interval
            .unwrap_or(self.defaults.update_interval)
            .max(1);

        let from = request.from;
        let mut to = request.to;
        if let Some(last) = self.last_page(page_size) {
            if last > 0 && to > last {
                tracing::info!(requested = to, last_page = last, "Clamping range to last page");
                to = last;
            }
        }
        validate_range(from, to)?;

        self.progress.seed_pending(from, to);
        if let Err(e) = self.snapshot.save(&self.progress.get_all()) {
            tracing::error!(error = %e, "Error saving initial progress");
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        let stats = Arc::new(WriterStats::new());
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = stats.clone();

        let (records_tx, records_rx) = mpsc::channel::<RecordResult>(CHANNEL_CAPACITY);
        let (pages_tx, pages_rx) = mpsc::channel::<PageProgress>(CHANNEL_CAPACITY);

        let crawl = {
            let crawler = self.crawler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                crawler
                    .scrape_range(
                        from,
                        to,
                        page_size.as_u32(),
                        records_tx,
                        pages_tx,
                        update_interval,
                        cancel,
                    )
                    .await
            })
        };

        let write = {
            let writer = BatchWriter::with_stats(self.storage.clone(), batch_size, stats);
            tokio::spawn(async move { writer.drain(records_rx).await })
        };

        let update = tokio::spawn(update_progress(
            pages_rx,
            self.progress.clone(),
            self.snapshot.clone(),
        ));

        tracing::info!(from, to, page_size = %page_size, batch_size, update_interval, "Indexing started");

        let job_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let (crawled, written, updated) = tokio::join!(crawl, write, update);

            if let Err(e) = crawled? {
                tracing::error!(error = %e, "Error indexing");
            }
            let pages_finished = updated?;
            let writer = written??;
            let cancelled = job_cancel.is_cancelled();

            tracing::info!(
                from,
                to,
                pages_finished,
                inserted = writer.inserted,
                cancelled,
                "Indexing finished"
            );

            Ok(JobReport {
                from,
                to,
                page_size: page_size.as_u32(),
                pages_finished,
                writer,
                cancelled,
            })
        });

        Ok(JobHandle {
            from,
            to,
            cancel,
            task,
        })
    }

    /// Cancels the running job
    ///
    /// # Returns
    ///
    /// `true` if a job was running
    pub fn stop(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        tracing::info!("Stop requested");
        true
    }

    /// Reports page progress and writer counters
    ///
    /// Falls back to the snapshot file when nothing is in memory yet.
    pub fn status(&self) -> StatusReport {
        let mut snapshot = self.progress.get_all();
        if snapshot.is_empty() {
            snapshot = self.snapshot.load();
        }

        let writer = self
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();

        StatusReport::from_snapshot(snapshot, self.is_running(), writer)
    }
}

/// Applies page updates to the store and persists a snapshot after each one
///
/// # Returns
///
/// The number of `Finished` updates applied
async fn update_progress(
    mut updates: mpsc::Receiver<PageProgress>,
    progress: Arc<ProgressStore>,
    snapshot: Arc<SnapshotFile>,
) -> usize {
    let mut finished = 0;

    while let Some(update) = updates.recv().await {
        tracing::info!(
            page = update.page,
            total = update.total,
            state = %update.state,
            "Update data page"
        );

        let is_finished = update.state == PageState::Finished;
        if progress.set(update) && is_finished {
            finished += 1;
        }

        let copy = progress.get_all();
        let file = snapshot.clone();
        let saved = tokio::task::spawn_blocking(move || file.save(&copy)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Error saving progress snapshot"),
            Err(e) => tracing::error!(error = %e, "Snapshot task failed"),
        }
    }

    finished
}
