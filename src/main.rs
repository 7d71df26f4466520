//! Archive indexer main entry point
//!
//! This is the command-line interface for the archive indexer.

use anyhow::Context;
use archive_indexer::config::{load_config, Config};
use archive_indexer::console::Console;
use archive_indexer::crawler::Crawler;
use archive_indexer::indexer::Orchestrator;
use archive_indexer::output::{format_statistics, format_status, load_statistics};
use archive_indexer::state::SnapshotFile;
use archive_indexer::storage::{open_storage, Storage, RECORDS_TABLE, SEARCH_TABLE};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Archive indexer: a resumable crawl-and-load pipeline
///
/// Harvests a paginated record listing and its detail pages into a SQLite
/// archive with full-text search, tracking per-page progress in a JSON file.
#[derive(Parser, Debug)]
#[command(name = "archive-indexer")]
#[command(version = "1.0.0")]
#[command(about = "Resumable crawl-and-load indexer for paginated archives", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Ignore the stored progress snapshot
    #[arg(long)]
    fresh: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Show stored progress and statistics, then exit
    #[arg(long)]
    status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;

    if cli.status {
        handle_status(&config)
    } else {
        handle_console(config, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to stderr so they never interleave with console output on stdout.
fn setup_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("archive_indexer=info,warn"),
            1 => EnvFilter::new("archive_indexer=debug,info"),
            2 => EnvFilter::new("archive_indexer=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// Handles the --status mode: prints stored progress and statistics
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let snapshot = SnapshotFile::new(&config.output.progress_path);
    let storage = open_storage(Path::new(&config.output.database_path))?;

    let report = archive_indexer::indexer::StatusReport::from_snapshot(
        snapshot.load(),
        false,
        Default::default(),
    );
    let stats = load_statistics(&storage)?;

    print!("{}", format_status(&report, true));
    println!();
    print!("{}", format_statistics(&stats, &report));

    Ok(())
}

/// Runs the interactive console
async fn handle_console(config: Config, fresh: bool) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    for table in [RECORDS_TABLE, SEARCH_TABLE] {
        if !storage.table_exists(table)? {
            anyhow::bail!("table '{}' is missing from {}", table, config.output.database_path);
        }
    }
    tracing::info!(
        records = storage.count_records()?,
        "Opened archive {}",
        config.output.database_path
    );

    let crawler = Crawler::new(&config.scraper)?;
    let orchestrator = Orchestrator::new(
        crawler,
        Arc::new(Mutex::new(storage)),
        SnapshotFile::new(&config.output.progress_path),
        config.indexer.clone(),
    );

    if fresh {
        tracing::info!("Starting fresh (ignoring stored progress)");
    } else {
        let pages = orchestrator.restore();
        tracing::info!(pages, "Restored stored progress");
    }

    orchestrator.discover_last_page().await;

    let console = Console::new(Arc::new(orchestrator));
    console
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    Ok(())
}
