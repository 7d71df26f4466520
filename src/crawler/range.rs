//! Page range crawling
//!
//! [`Crawler::scrape_range`] walks a listing range, fans the rows of each page
//! out to concurrent workers gated by a row semaphore, and streams results on
//! two channels. The crawler owns both senders: once every page and row task
//! has finished, the last clones drop and both channels close.

use crate::config::ScraperConfig;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::{
    parse_content, parse_last_page, parse_listing, ListingCell, ListingRow,
};
use crate::crawler::row::parse_row;
use crate::crawler::sanitize::{HtmlSanitizer, Sanitizer};
use crate::crawler::PageSize;
use crate::record::{Record, RecordResult, RowError};
use crate::state::PageProgress;
use crate::{IndexerError, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Error annotation of a page interrupted by a stop request
pub const CANCELLED_ANNOTATION: &str = "cancelled";

/// Crawls listing pages and their detail pages
#[derive(Clone)]
pub struct Crawler {
    fetcher: Arc<Fetcher>,
    sanitizer: Arc<dyn Sanitizer>,
    listing_url: String,
    content_url: String,
    row_concurrency: usize,
}

/// Everything one page task needs, cloned per page
#[derive(Clone)]
struct PageContext {
    crawler: Crawler,
    page_size: PageSize,
    records_out: mpsc::Sender<RecordResult>,
    pages_out: mpsc::Sender<PageProgress>,
    update_interval: u32,
    row_gate: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl Crawler {
    /// Creates a crawler that sanitizes fields with [`HtmlSanitizer`]
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Self::with_sanitizer(config, Arc::new(HtmlSanitizer))
    }

    pub fn with_sanitizer(config: &ScraperConfig, sanitizer: Arc<dyn Sanitizer>) -> Result<Self> {
        Ok(Self {
            fetcher: Arc::new(Fetcher::new(config)?),
            sanitizer,
            listing_url: config.listing_url.clone(),
            content_url: config.content_url.clone(),
            row_concurrency: config.row_concurrency.max(1) as usize,
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Builds the listing URL for a page
    pub fn listing_url(&self, page: u32, page_size: PageSize) -> String {
        self.listing_url
            .replace("{page_size}", &page_size.as_u32().to_string())
            .replace("{page}", &page.to_string())
    }

    /// Builds the detail URL for a record
    pub fn content_url(&self, id: u32) -> String {
        self.content_url.replace("{id}", &id.to_string())
    }

    /// Scrapes every page of `[from, to]`
    ///
    /// Every row yields one [`RecordResult`] on `records_out`. Each page yields
    /// a `Processing` update on `pages_out` every `update_interval` rows (best
    /// effort) and exactly one `Finished` update once all of its rows are done.
    /// Pages not started before `cancel` fires produce nothing and stay pending.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` before any request when the range or page
    /// size is invalid. Page and row failures never fail the call.
    #[allow(clippy::too_many_arguments)]
    pub async fn scrape_range(
        &self,
        from: u32,
        to: u32,
        page_size: u32,
        records_out: mpsc::Sender<RecordResult>,
        pages_out: mpsc::Sender<PageProgress>,
        update_interval: u32,
        cancel: CancellationToken,
    ) -> Result<()> {
        validate_range(from, to)?;
        let page_size = PageSize::try_from(page_size)?;

        let context = PageContext {
            crawler: self.clone(),
            page_size,
            records_out,
            pages_out,
            update_interval: update_interval.max(1),
            row_gate: Arc::new(Semaphore::new(self.row_concurrency)),
            cancel,
        };

        tracing::info!(from, to, page_size = %page_size, "Scraping pages");

        let mut pages = JoinSet::new();
        for page in from..=to {
            pages.spawn(context.clone().scrape_page(page));
        }
        // Only the page tasks hold senders from here on
        drop(context);

        while let Some(joined) = pages.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Page task failed");
            }
        }

        tracing::info!(from, to, "Finished scraping pages");
        Ok(())
    }

    /// Probes the first listing page and reads the last page number
    pub async fn last_page(&self, page_size: u32) -> Result<u32> {
        let page_size = PageSize::try_from(page_size)?;
        let url = self.listing_url(1, page_size);
        let body = self.fetcher.fetch_text(&url).await?;

        parse_last_page(&body).map_err(|message| IndexerError::Parse { url, message })
    }

    /// Parses one row and fetches its detail page when the row is complete
    async fn scrape_row(&self, cells: &[ListingCell], cancel: &CancellationToken) -> RecordResult {
        let parsed = parse_row(cells, self.sanitizer.as_ref());
        if !parsed.wants_content() || cancel.is_cancelled() {
            return parsed.into_result();
        }

        let mut result = parsed.into_result();
        let id = result.record.id;
        let url = self.content_url(id);

        match self.fetcher.fetch_text(&url).await {
            Ok(body) => match parse_content(&body) {
                Some(content) => result.record.body = self.sanitizer.sanitize(&content),
                None => tracing::warn!(id, "Detail page has no content block"),
            },
            Err(e) => tracing::error!(id, error = %e, "Error getting record content"),
        }

        result
    }
}

impl PageContext {
    async fn scrape_page(self, page: u32) {
        let url = self.crawler.listing_url(page, self.page_size);

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(page, "Skipping page: job cancelled");
                return;
            }
            fetched = self.crawler.fetcher.fetch(&url) => fetched,
        };

        let body = match fetched.into_body(&url) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(page, error = %e, "Failed to fetch listing page");
                self.finish(page, 0, Some(e.to_string())).await;
                return;
            }
        };

        let rows = match parse_listing(&body) {
            Ok(rows) => rows,
            Err(message) => {
                tracing::warn!(page, %message, "Listing page has no result table");
                self.finish(page, 0, Some(message)).await;
                return;
            }
        };

        let total = Arc::new(AtomicU32::new(0));
        let mut rows_in_flight = JoinSet::new();

        for cells in rows {
            let Ok(permit) = self.row_gate.clone().acquire_owned().await else {
                break;
            };
            let context = self.clone();
            let total = total.clone();
            rows_in_flight.spawn(async move {
                let _permit = permit;
                context.process_row(page, cells, &total).await;
            });
        }

        while let Some(joined) = rows_in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(page, error = %e, "Row task failed");
            }
        }

        let error = self
            .cancel
            .is_cancelled()
            .then(|| CANCELLED_ANNOTATION.to_string());
        self.finish(page, total.load(Ordering::SeqCst), error).await;
    }

    async fn process_row(&self, page: u32, cells: ListingRow, total: &AtomicU32) {
        let current = total.fetch_add(1, Ordering::SeqCst) + 1;

        if current % self.update_interval == 0 {
            // Progress updates are advisory; drop them when the updater lags
            let _ = self
                .pages_out
                .try_send(PageProgress::processing(page, current));
        }

        let result = if self.cancel.is_cancelled() {
            RecordResult::failed(Record::default(), RowError::Cancelled)
        } else {
            self.crawler.scrape_row(&cells, &self.cancel).await
        };

        if current % 10 == 0 {
            tracing::trace!(page, rows = current, "Rows processed");
        }

        if self.records_out.send(result).await.is_err() {
            tracing::debug!(page, "Record channel closed; dropping row");
        }
    }

    async fn finish(&self, page: u32, total: u32, error: Option<String>) {
        tracing::debug!(page, total, "Scraped page");
        if self
            .pages_out
            .send(PageProgress::finished(page, total, error))
            .await
            .is_err()
        {
            tracing::debug!(page, "Page channel closed; dropping final state");
        }
    }
}

/// Rejects ranges that cannot be scraped
pub fn validate_range(from: u32, to: u32) -> Result<()> {
    if from < 1 {
        return Err(IndexerError::InvalidParameter(
            "from page must be greater than 0".to_string(),
        ));
    }
    if to < 1 {
        return Err(IndexerError::InvalidParameter(
            "to page must be greater than 0".to_string(),
        ));
    }
    if from > to {
        return Err(IndexerError::InvalidParameter(format!(
            "from page {} is greater than to page {}",
            from, to
        )));
    }
    Ok(())
}
