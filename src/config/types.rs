use serde::Deserialize;

/// Default number of listing pages fetched in parallel
pub const DEFAULT_PARALLELISM: u32 = 10;

/// Default spacing between two requests to the same host (milliseconds)
pub const DEFAULT_DELAY_MS: u64 = 1000;

/// Default request timeout ceiling (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of rows parsed concurrently within the crawl
pub const DEFAULT_ROW_CONCURRENCY: u32 = 50;

pub const DEFAULT_PAGE_SIZE: u32 = 200;
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_UPDATE_INTERVAL: u32 = 50;

/// Main configuration structure for the indexer
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    pub output: OutputConfig,
}

/// Remote source and network discipline
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Listing page template with `{page_size}` and `{page}` placeholders
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// Detail page template with an `{id}` placeholder
    #[serde(rename = "content-url")]
    pub content_url: String,

    /// Hosts the crawler may contact
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Vec<String>,

    /// Maximum number of requests in flight
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(
        rename = "request-timeout-secs",
        default = "default_request_timeout_secs"
    )]
    pub request_timeout_secs: u64,

    /// Capacity of the row semaphore
    #[serde(rename = "row-concurrency", default = "default_row_concurrency")]
    pub row_concurrency: u32,

    /// User agents rotated per request; a built-in list is used when empty
    #[serde(rename = "user-agents", default)]
    pub user_agents: Vec<String>,
}

/// Defaults for index jobs started from the console
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Number of records per storage transaction
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows between two progress updates of a page
    #[serde(rename = "update-interval", default = "default_update_interval")]
    pub update_interval: u32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            update_interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON progress snapshot
    #[serde(rename = "progress-path")]
    pub progress_path: String,
}

fn default_parallelism() -> u32 {
    DEFAULT_PARALLELISM
}

fn default_delay_ms() -> u64 {
    DEFAULT_DELAY_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_row_concurrency() -> u32 {
    DEFAULT_ROW_CONCURRENCY
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_update_interval() -> u32 {
    DEFAULT_UPDATE_INTERVAL
}
