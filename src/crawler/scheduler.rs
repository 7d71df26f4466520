//! Request admission control
//!
//! This module handles:
//! - Global concurrency limiting via a semaphore
//! - Per-domain concurrency caps
//! - Respecting the minimum delay between requests to one domain

use crate::state::DomainState;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Permits held for the duration of one request
///
/// Dropping the admission releases both the global and the domain slot.
pub struct Admission {
    _global: OwnedSemaphorePermit,
    _domain: OwnedSemaphorePermit,
}

struct DomainSlot {
    semaphore: Arc<Semaphore>,
    state: DomainState,
}

/// Scheduler gates every outgoing request
///
/// The scheduler coordinates:
/// - Global concurrency limits (requests in flight across all domains)
/// - Per-domain concurrency limits
/// - Per-domain pacing (minimum time between request starts)
pub struct Scheduler {
    /// Global semaphore for limiting concurrent requests
    global_semaphore: Arc<Semaphore>,

    /// Maximum concurrent requests to a single domain
    per_domain_limit: usize,

    /// Minimum spacing between request starts to one domain
    delay: Duration,

    /// Per-domain state tracking
    domains: Mutex<HashMap<String, DomainSlot>>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `global_limit` - Requests allowed in flight across all domains
    /// * `per_domain_limit` - Requests allowed in flight against one domain
    /// * `delay` - Minimum time between two request starts to one domain
    pub fn new(global_limit: usize, per_domain_limit: usize, delay: Duration) -> Self {
        Self {
            global_semaphore: Arc::new(Semaphore::new(global_limit.max(1))),
            per_domain_limit: per_domain_limit.max(1),
            delay,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until a request to `domain` may start
    ///
    /// # Returns
    ///
    /// * `Some(Admission)` - The request may proceed while the admission is held
    /// * `None` - The scheduler's semaphores were closed
    pub async fn admit(&self, domain: &str) -> Option<Admission> {
        let global = self.global_semaphore.clone().acquire_owned().await.ok()?;

        let domain_semaphore = {
            let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
            domains
                .entry(domain.to_string())
                .or_insert_with(|| DomainSlot {
                    semaphore: Arc::new(Semaphore::new(self.per_domain_limit)),
                    state: DomainState::new(),
                })
                .semaphore
                .clone()
        };
        let domain_permit = domain_semaphore.acquire_owned().await.ok()?;

        loop {
            let wait = {
                let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
                let slot = domains.get_mut(domain)?;
                let now = Instant::now();
                match slot.state.time_until_next_request(self.delay, now) {
                    None => {
                        slot.state.record_request(now);
                        None
                    }
                    Some(wait) => Some(wait),
                }
            };

            match wait {
                None => break,
                Some(wait) => {
                    tracing::trace!(domain, ?wait, "Waiting for domain delay");
                    tokio::time::sleep(wait).await;
                }
            }
        }

        Some(Admission {
            _global: global,
            _domain: domain_permit,
        })
    }

    /// Returns how many requests were admitted to `domain`
    pub fn request_count(&self, domain: &str) -> u64 {
        let domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        domains
            .get(domain)
            .map(|slot| slot.state.request_count)
            .unwrap_or(0)
    }

    /// Returns the number of free global slots
    pub fn available_permits(&self) -> usize {
        self.global_semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admit_counts_requests() {
        let scheduler = Scheduler::new(4, 2, Duration::ZERO);

        let first = scheduler.admit("example.com").await;
        assert!(first.is_some());
        drop(first);
        scheduler.admit("example.com").await.unwrap();

        assert_eq!(scheduler.request_count("example.com"), 2);
        assert_eq!(scheduler.request_count("other.example"), 0);
    }

    #[tokio::test]
    async fn test_global_permit_released_on_drop() {
        let scheduler = Scheduler::new(2, 2, Duration::ZERO);

        let admission = scheduler.admit("example.com").await.unwrap();
        assert_eq!(scheduler.available_permits(), 1);

        drop(admission);
        assert_eq!(scheduler.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_domain_cap_blocks() {
        let scheduler = Arc::new(Scheduler::new(4, 1, Duration::ZERO));
        let held = scheduler.admit("example.com").await.unwrap();

        let blocked = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.admit("example.com").await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        // Another domain is not affected by the cap
        let other = tokio::time::timeout(Duration::from_secs(1), scheduler.admit("other.example"))
            .await
            .unwrap();
        assert!(other.is_some());

        drop(held);
        assert!(blocked.await.unwrap());
    }

    #[tokio::test]
    async fn test_delay_spaces_requests() {
        let scheduler = Scheduler::new(4, 4, Duration::from_millis(100));
        let start = Instant::now();

        scheduler.admit("example.com").await.unwrap();
        scheduler.admit("example.com").await.unwrap();
        scheduler.admit("example.com").await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
