//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client (cookie store, timeouts, redirect policy)
//! - Rotating the user agent per request
//! - Refusing hosts outside the allow-list without touching the network
//! - Error classification

use crate::config::ScraperConfig;
use crate::crawler::scheduler::Scheduler;
use crate::IndexerError;
use reqwest::{header::USER_AGENT, redirect::Policy, Client};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// User agents rotated when the configuration lists none
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
];

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// Host is not in the allow-list; no request was made
    Blocked {
        /// The refused host
        host: String,
    },

    /// Server answered with a non-success status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    /// Converts the result into the page body or a transport error
    pub fn into_body(self, url: &str) -> Result<String, IndexerError> {
        let message = match self {
            FetchResult::Success { body, .. } => return Ok(body),
            FetchResult::Blocked { host } => format!("host '{}' is not allowed", host),
            FetchResult::HttpError { status_code } => format!("HTTP status {}", status_code),
            FetchResult::NetworkError { error } => error,
        };

        Err(IndexerError::Transport {
            url: url.to_string(),
            message,
        })
    }
}

/// Builds an HTTP client with proper configuration
///
/// One client (and so one cookie store) is shared by every request of a run.
/// Redirects are followed only while they stay on allowed hosts.
pub fn build_http_client(config: &ScraperConfig) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let allowed = config.allowed_domains.clone();

    let redirect_policy = Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if is_allowed_host(attempt.url(), &allowed) {
            attempt.follow()
        } else {
            attempt.stop()
        }
    });

    Client::builder()
        .cookie_store(true)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(redirect_policy)
        .gzip(true)
        .brotli(true)
        .build()
}

fn is_allowed_host(url: &Url, allowed: &[String]) -> bool {
    url.host_str()
        .map(|host| allowed.iter().any(|domain| domain == host))
        .unwrap_or(false)
}

/// Fetches pages through the scheduler with a rotating user agent
pub struct Fetcher {
    client: Client,
    scheduler: Arc<Scheduler>,
    allowed_domains: Vec<String>,
    user_agents: Vec<String>,
    next_agent: AtomicUsize,
}

impl Fetcher {
    /// Creates a fetcher and its scheduler from the scraper configuration
    pub fn new(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        let per_domain = config.parallelism as usize;
        let global = per_domain * config.allowed_domains.len().max(1);
        let scheduler = Scheduler::new(global, per_domain, Duration::from_millis(config.delay_ms));

        let user_agents = if config.user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            config.user_agents.clone()
        };

        Ok(Self {
            client,
            scheduler: Arc::new(scheduler),
            allowed_domains: config.allowed_domains.clone(),
            user_agents,
            next_agent: AtomicUsize::new(0),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Picks the next user agent in round-robin order
    fn next_user_agent(&self) -> &str {
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        &self.user_agents[index]
    }

    /// Fetches a URL
    ///
    /// # Request Flow
    ///
    /// 1. Refuse hosts outside the allow-list (no I/O)
    /// 2. Wait for admission from the scheduler
    /// 3. Send the GET request with the next user agent
    /// 4. Classify the response
    pub async fn fetch(&self, url: &str) -> FetchResult {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return FetchResult::NetworkError {
                    error: format!("invalid URL: {}", e),
                }
            }
        };

        let host = parsed.host_str().unwrap_or_default().to_string();
        if !is_allowed_host(&parsed, &self.allowed_domains) {
            tracing::warn!(url, host = %host, "Refusing request to host outside allow-list");
            return FetchResult::Blocked { host };
        }

        let Some(_admission) = self.scheduler.admit(&host).await else {
            return FetchResult::NetworkError {
                error: "request scheduler closed".to_string(),
            };
        };

        tracing::info!(
            url,
            domain_requests = self.scheduler.request_count(&host),
            "Visiting"
        );

        let response = match self
            .client
            .get(parsed)
            .header(USER_AGENT, self.next_user_agent())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "Request failed");
            return FetchResult::HttpError {
                status_code: status.as_u16(),
            };
        }

        match response.text().await {
            Ok(body) => FetchResult::Success {
                final_url,
                status_code: status.as_u16(),
                body,
            },
            Err(e) => classify_error(&e),
        }
    }

    /// Fetches a URL and returns its body, or a transport error
    pub async fn fetch_text(&self, url: &str) -> Result<String, IndexerError> {
        self.fetch(url).await.into_body(url)
    }
}

fn classify_error(e: &reqwest::Error) -> FetchResult {
    let error = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else if e.is_redirect() {
        format!("Redirect error: {}", e)
    } else {
        e.to_string()
    };

    FetchResult::NetworkError { error }
}
