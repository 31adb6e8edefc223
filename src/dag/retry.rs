// src/dag/retry.rs

//! Per-task retry policy.

use std::time::Duration;

/// How often a task may be attempted and how long to wait in between.
///
/// The delay before attempt `k + 1` is `backoff * multiplier^(k - 1)`, capped
/// at `max_backoff`. A multiplier of `1.0` gives a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    pub backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts every attempt, the first one included; it is
    /// raised to 1 so a task always runs at least once.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            multiplier: 1.0,
            max_backoff: backoff,
        }
    }

    /// One attempt, no retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// `retries` extra attempts after the first one.
    pub fn with_retries(retries: u32, backoff: Duration) -> Self {
        Self::new(retries.saturating_add(1), backoff)
    }

    pub fn exponential(mut self, multiplier: f64, max_backoff: Duration) -> Self {
        self.multiplier = multiplier.max(1.0);
        self.max_backoff = max_backoff.max(self.backoff);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = self.backoff.as_secs_f64() * exp;
        let capped = raw.min(self.max_backoff.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

impl Default for RetryPolicy {
    /// Three retries, five minutes apart.
    fn default() -> Self {
        Self::with_retries(3, Duration::from_secs(5 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_by_default() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts(), 4);
        assert_eq!(p.delay_after(1), Duration::from_secs(300));
        assert_eq!(p.delay_after(3), Duration::from_secs(300));
    }

    #[test]
    fn exponential_delay_is_capped() {
        let p = RetryPolicy::new(10, Duration::from_secs(1))
            .exponential(2.0, Duration::from_secs(10));
        let got: Vec<u64> = (1..=6).map(|k| p.delay_after(k).as_secs()).collect();
        assert_eq!(got, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn at_least_one_attempt() {
        let p = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(p.max_attempts(), 1);
        assert!(p.allows_retry(0));
        assert!(!p.allows_retry(1));
    }
}
