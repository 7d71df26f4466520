use std::time::{Duration, Instant};

/// Tracks request pacing for one domain
///
/// Every request to a domain must start at least `delay` after the previous
/// one. The scheduler keeps one of these per allow-listed host.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests admitted to this domain in the current process
    pub request_count: u64,

    /// Timestamp of the last admitted request
    pub last_request_time: Option<Instant>,
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request was admitted
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can start
    ///
    /// Returns None if a request can start now.
    pub fn time_until_next_request(&self, delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < delay {
            Some(delay - elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_domain_state() {
        let state = DomainState::new();
        assert_eq!(state.request_count, 0);
        assert!(state.last_request_time.is_none());
    }

    #[test]
    fn test_first_request_never_waits() {
        let state = DomainState::new();
        assert!(state
            .time_until_next_request(Duration::from_secs(1), Instant::now())
            .is_none());
    }

    #[test]
    fn test_cannot_request_before_delay() {
        let mut state = DomainState::new();
        let now = Instant::now();
        state.record_request(now);

        assert!(state
            .time_until_next_request(Duration::from_secs(1), now)
            .is_some());
        assert!(state
            .time_until_next_request(Duration::from_secs(1), now + Duration::from_millis(1000))
            .is_none());
    }

    #[test]
    fn test_zero_delay_never_waits() {
        let mut state = DomainState::new();
        let now = Instant::now();
        state.record_request(now);
        assert!(state.time_until_next_request(Duration::ZERO, now).is_none());
    }

    #[test]
    fn test_time_until_next_request() {
        let mut state = DomainState::new();
        let now = Instant::now();
        state.record_request(now);

        let wait = state
            .time_until_next_request(Duration::from_millis(1000), now + Duration::from_millis(400))
            .unwrap();
        assert_eq!(wait, Duration::from_millis(600));
        assert!(state
            .time_until_next_request(Duration::from_millis(1000), now + Duration::from_secs(2))
            .is_none());
    }

    #[test]
    fn test_record_request_counts() {
        let mut state = DomainState::new();
        let now = Instant::now();
        state.record_request(now);
        state.record_request(now);
        assert_eq!(state.request_count, 2);
        assert_eq!(state.last_request_time, Some(now));
    }
}
