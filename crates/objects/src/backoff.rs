// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

const INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const MULTIPLIER: f64 = 1.5;
const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Exponential backoff bounded by a total elapsed time.
///
/// Intervals grow from 500ms by a factor of 1.5, capped at 60s. Once sleeping for the next
/// interval would cross `max_elapsed` (measured from construction), no further interval is
/// handed out.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current_interval: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
    start: Instant,
}

impl ExponentialBackoff {
    pub fn new(max_elapsed: Duration) -> Self {
        Self::with_initial_interval(INITIAL_INTERVAL, max_elapsed)
    }

    fn with_initial_interval(initial_interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            current_interval: initial_interval,
            max_interval: MAX_INTERVAL,
            max_elapsed,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Next interval to wait before retrying, or `None` when retries are exhausted
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let interval = self.current_interval;
        match self.elapsed().checked_add(interval) {
            Some(deadline) if deadline <= self.max_elapsed => {}
            _ => return None,
        }
        self.current_interval = interval.mul_f64(MULTIPLIER).min(self.max_interval);
        Some(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intervals_grow_exponentially() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(3600));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(750)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1125)));
    }

    #[test]
    fn test_interval_is_capped() {
        let mut backoff =
            ExponentialBackoff::with_initial_interval(Duration::from_secs(50), Duration::MAX);
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(50)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(60)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_stops_at_max_elapsed() {
        let mut backoff = ExponentialBackoff::with_initial_interval(
            Duration::from_millis(40),
            Duration::from_millis(100),
        );
        // 50ms slept + 60ms next interval > 100ms
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(40)));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(backoff.next_backoff(), None);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let mut backoff = ExponentialBackoff::new(Duration::ZERO);
        assert_eq!(backoff.next_backoff(), None);
    }
}
