//! Statistics and status rendering
//!
//! Everything here renders to a `String`; the console decides where it goes.

use crate::indexer::{JobReport, StatusReport};
use crate::state::PageState;
use crate::storage::{SearchPage, Storage, StorageResult};
use std::fmt::Write;

/// Archive-wide numbers read from storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStatistics {
    /// Records stored in the archive
    pub total_records: u64,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<ArchiveStatistics> {
    Ok(ArchiveStatistics {
        total_records: storage.count_records()?,
    })
}

/// Renders the page table and totals of a status report
///
/// With `show_pages` unset only the totals are rendered.
pub fn format_status(report: &StatusReport, show_pages: bool) -> String {
    let mut out = String::new();

    if report.pages.is_empty() {
        out.push_str("No pages to show status\n");
        return out;
    }

    if show_pages {
        for page in &report.pages {
            let _ = write!(
                out,
                "Page: {}, State: {}, Total: {}",
                page.page, page.state, page.total
            );
            if page.has_error() {
                let _ = write!(out, ", Error: {}", page.error);
            }
            out.push('\n');
        }
    }

    let _ = writeln!(
        out,
        "Total pages: {}, Pending pages: {}, Processing pages: {}, Finished pages: {}, Pages with errors: {}",
        report.total_pages(),
        report.pending,
        report.processing,
        report.finished,
        report.errored
    );
    let _ = writeln!(out, "Rows seen: {}", report.total_rows());

    if report.running {
        let w = &report.writer;
        let _ = writeln!(
            out,
            "Indexing in progress: {} inserted, {} duplicates, {} discarded, {} failed batches",
            w.inserted, w.duplicates, w.discarded, w.failed_batches
        );
    }

    out
}

/// Renders the outcome of a finished job
pub fn format_job_report(report: &JobReport) -> String {
    let outcome = if report.cancelled {
        "stopped"
    } else {
        "finished"
    };
    let w = &report.writer;

    format!(
        "Indexing {} for pages {} to {} ({} pages finished): {} inserted, {} duplicates, {} discarded, {} failed batches",
        outcome,
        report.from,
        report.to,
        report.pages_finished,
        w.inserted,
        w.duplicates,
        w.discarded,
        w.failed_batches
    )
}

/// Renders one page of search results
pub fn format_search_page(page: &SearchPage, page_number: u32, limit: u32) -> String {
    let mut out = String::new();

    if page.records.is_empty() {
        out.push_str("No records found\n");
        return out;
    }

    for record in &page.records {
        let _ = writeln!(
            out,
            "#{} [{}] {} | from: {} | to: {}",
            record.id,
            record.sent_at.format("%Y-%m-%d %H:%M"),
            record.subject,
            record.sender,
            record.recipient
        );
    }

    let pages = page.total.div_ceil(u64::from(limit.max(1)));
    let _ = writeln!(
        out,
        "Page {} of {} ({} matches)",
        page_number, pages, page.total
    );

    out
}

/// Renders the statistics block printed at startup
pub fn format_statistics(stats: &ArchiveStatistics, status: &StatusReport) -> String {
    let finished_share = if status.total_pages() > 0 {
        (status.finished as f64 / status.total_pages() as f64) * 100.0
    } else {
        0.0
    };

    let mut out = String::new();
    let _ = writeln!(out, "=== Archive Statistics ===");
    let _ = writeln!(out, "  Records stored: {}", stats.total_records);
    let _ = writeln!(out, "  Pages tracked: {}", status.total_pages());
    for state in PageState::all_states() {
        let count = match state {
            PageState::Pending => status.pending,
            PageState::Processing => status.processing,
            PageState::Finished => status.finished,
        };
        let _ = writeln!(out, "  {}: {}", state, count);
    }
    let _ = writeln!(out, "  Completion: {:.1}%", finished_share);

    out
}
