//! Interactive operator console
//!
//! Reads one command per line, runs it against the [`Orchestrator`] and
//! writes the answer back. Job completion notices are interleaved with
//! command output as soon as they arrive.

use crate::crawler::PageSize;
use crate::indexer::{JobRequest, Orchestrator};
use crate::output::{format_job_report, format_search_page, format_status};
use crate::storage::{MatchMode, SearchQuery, Storage, StorageError};
use crate::{IndexerError, Result};
use clap::{Parser, Subcommand};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PROMPT: &str = "> write a command: ";

#[derive(Parser, Debug)]
#[command(
    name = "console",
    no_binary_name = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct CommandLine {
    #[command(subcommand)]
    command: Command,
}

/// A console command
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start indexing pages N to M
    Index {
        #[arg(long, default_value_t = 1)]
        from: u32,

        #[arg(long, default_value_t = 1)]
        to: u32,

        #[arg(long)]
        page_size: Option<u32>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Rows between progress updates
        #[arg(long)]
        interval: Option<u32>,
    },

    /// Show page progress
    Status {
        /// Only print totals
        #[arg(long)]
        summary: bool,
    },

    /// Stop the running job
    Stop,

    /// Search stored records
    Search {
        /// Match any term instead of all terms
        #[arg(long)]
        any: bool,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 10)]
        limit: u32,

        terms: Vec<String>,
    },

    /// Show available commands
    Help,

    /// Leave the console
    #[command(alias = "quit")]
    Exit,
}

/// Parses one input line into a command
pub fn parse_command(line: &str) -> std::result::Result<Command, String> {
    CommandLine::try_parse_from(line.split_whitespace())
        .map(|parsed| parsed.command)
        .map_err(|e| e.render().to_string())
}

/// Whether the loop should keep reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Exit,
}

/// Console bound to one orchestrator
pub struct Console<S> {
    orchestrator: Arc<Orchestrator<S>>,
    notices_tx: mpsc::UnboundedSender<String>,
    notices_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    job_waiter: Mutex<Option<JoinHandle<()>>>,
}

impl<S> Console<S>
where
    S: Storage + Send + 'static,
{
    pub fn new(orchestrator: Arc<Orchestrator<S>>) -> Self {
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            notices_tx,
            notices_rx: tokio::sync::Mutex::new(notices_rx),
            job_waiter: Mutex::new(None),
        }
    }

    pub fn help_text(&self) -> String {
        let mut index = String::from(
            "  index --from N --to M   Start indexing from page N to M (default 1)",
        );
        let last_page = PageSize::try_from(self.orchestrator.defaults().page_size)
            .ok()
            .and_then(|size| self.orchestrator.last_page(size));
        if let Some(last) = last_page {
            index.push_str(&format!(" (last page: {})", last));
        }

        format!(
            "Available commands:\n{}\n{}\n{}\n{}\n{}\n{}\n",
            index,
            "      [--page-size P] [--batch-size B] [--interval I]",
            "  status [--summary]      Show current status",
            "  stop                    Stop the running job",
            "  search [--any] [--page N] [--limit N] TERMS...   Search stored records",
            "  help                    Show this help message\n  exit                    Exit the CLI",
        )
    }

    /// Runs one command and returns the text to show
    pub async fn execute(&self, command: Command) -> (Outcome, String) {
        match command {
            Command::Index {
                from,
                to,
                page_size,
                batch_size,
                interval,
            } => {
                let mut request = JobRequest::new(from, to);
                if let Some(page_size) = page_size {
                    request = request.with_page_size(page_size);
                }
                if let Some(batch_size) = batch_size {
                    request = request.with_batch_size(batch_size);
                }
                if let Some(interval) = interval {
                    request = request.with_update_interval(interval);
                }
                (Outcome::Continue, self.start_index(request))
            }
            Command::Status { summary } => (
                Outcome::Continue,
                format_status(&self.orchestrator.status(), !summary),
            ),
            Command::Stop => {
                let text = if self.orchestrator.stop() {
                    "Stopping the running job\n"
                } else {
                    "No job is running\n"
                };
                (Outcome::Continue, text.to_string())
            }
            Command::Search {
                any,
                page,
                limit,
                terms,
            } => {
                let mode = if any { MatchMode::Any } else { MatchMode::All };
                let query = SearchQuery::new(&terms.join(" "), mode, page, limit);
                let text = match self.search(query.clone()).await {
                    Ok(results) => format_search_page(&results, query.page, query.limit),
                    Err(e) => format!("Search failed: {}\n", e),
                };
                (Outcome::Continue, text)
            }
            Command::Help => (Outcome::Continue, self.help_text()),
            Command::Exit => {
                let mut text = String::new();
                if self.orchestrator.stop() {
                    text.push_str("Stopping the running job\n");
                }
                self.wait_for_job().await;
                text.push_str("Bye!\n");
                (Outcome::Exit, text)
            }
        }
    }

    fn start_index(&self, request: JobRequest) -> String {
        match self.orchestrator.start_job(request) {
            Ok(handle) => {
                let (from, to) = handle.range();
                let notices = self.notices_tx.clone();
                let waiter = tokio::spawn(async move {
                    let notice = match handle.wait().await {
                        Ok(report) => format_job_report(&report),
                        Err(e) => {
                            tracing::error!(error = %e, "Error indexing");
                            format!("Error indexing: {}", e)
                        }
                    };
                    let _ = notices.send(notice);
                });
                *self.job_waiter.lock().unwrap_or_else(PoisonError::into_inner) = Some(waiter);
                format!("Indexing from page {} to {}\n", from, to)
            }
            Err(IndexerError::AlreadyRunning) => "Already indexing\n".to_string(),
            Err(e) => format!("Cannot start indexing: {}\n", e),
        }
    }

    async fn search(&self, query: SearchQuery) -> Result<crate::storage::SearchPage> {
        let storage = self.orchestrator.storage();
        let page = tokio::task::spawn_blocking(move || {
            let storage = storage.lock().map_err(|_| StorageError::LockPoisoned)?;
            storage.search(&query)
        })
        .await??;
        Ok(page)
    }

    async fn wait_for_job(&self) {
        let waiter = self
            .job_waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(waiter) = waiter {
            if let Err(e) = waiter.await {
                tracing::error!(error = %e, "Job waiter failed");
            }
        }
    }

    /// Reads commands from `input` until `exit` or end of input
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut notices = self.notices_rx.lock().await;

        output.write_all(self.help_text().as_bytes()).await?;

        loop {
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;

            let line = loop {
                tokio::select! {
                    line = lines.next_line() => break line?,
                    Some(notice) = notices.recv() => {
                        output.write_all(format!("\n{}\n", notice).as_bytes()).await?;
                        output.flush().await?;
                    }
                }
            };

            let Some(line) = line else {
                // End of input behaves like `exit`
                let (_, text) = self.execute(Command::Exit).await;
                output.write_all(text.as_bytes()).await?;
                break;
            };

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (outcome, text) = match parse_command(line) {
                Ok(command) => self.execute(command).await,
                Err(message) => (Outcome::Continue, message),
            };
            output.write_all(text.as_bytes()).await?;

            if outcome == Outcome::Exit {
                break;
            }
        }

        while let Ok(notice) = notices.try_recv() {
            output.write_all(format!("{}\n", notice).as_bytes()).await?;
        }
        output.flush().await?;
        Ok(())
    }
}
