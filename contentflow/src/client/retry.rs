//! Retry and backoff policy for collaborator calls.
//!
//! Transient failures are retried under exponential backoff with jitter.
//! The jittered delay is drawn from `[0, ceiling]` where the ceiling doubles
//! per attempt up to a cap, so delay upper bounds are non-decreasing between
//! attempts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Jitter applied to backoff delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the full ceiling as the delay.
    None,
    /// Draw uniformly from `[0, ceiling]`.
    #[default]
    Full,
}

/// Retry configuration for a single collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (not retries on top of it).
    pub max_attempts: u32,
    /// Backoff base in milliseconds; the ceiling for attempt `n` is
    /// `base * 2^n`.
    pub base_delay_ms: u64,
    /// Cap on the backoff ceiling in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the backoff ceiling for a zero-indexed attempt.
    #[must_use]
    pub fn backoff_ceiling_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay_ms)
    }

    /// Returns the jittered delay to sleep before retrying after the given
    /// zero-indexed attempt failed.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling_ms(attempt);
        let ms = match self.jitter {
            JitterStrategy::None => ceiling,
            JitterStrategy::Full => {
                if ceiling == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=ceiling)
                }
            }
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert_eq!(policy.max_delay_ms, 8_000);
        assert_eq!(policy.jitter, JitterStrategy::Full);
    }

    #[test]
    fn test_ceiling_doubles_per_attempt() {
        let policy = RetryPolicy::new().with_base_delay_ms(100).with_max_delay_ms(10_000);

        assert_eq!(policy.backoff_ceiling_ms(0), 100);
        assert_eq!(policy.backoff_ceiling_ms(1), 200);
        assert_eq!(policy.backoff_ceiling_ms(2), 400);
    }

    #[test]
    fn test_ceiling_is_capped() {
        let policy = RetryPolicy::default();
        // 1s * 2^5 = 32s without the cap.
        assert_eq!(policy.backoff_ceiling_ms(5), 8_000);
    }

    #[test]
    fn test_ceilings_are_non_decreasing() {
        let policy = RetryPolicy::default();
        let ceilings: Vec<u64> = (0..8).map(|a| policy.backoff_ceiling_ms(a)).collect();
        assert!(ceilings.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_no_jitter_uses_ceiling() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(500)
            .with_jitter(JitterStrategy::None);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1_000));
    }

    #[test]
    fn test_full_jitter_stays_within_ceiling() {
        let policy = RetryPolicy::new().with_base_delay_ms(100);
        for attempt in 0..4 {
            for _ in 0..20 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay.as_millis() as u64 <= policy.backoff_ceiling_ms(attempt));
            }
        }
    }
}
