//! Bounded exponential backoff for transient transport failures.

use std::time::Duration;

use rand::Rng;

/// Retry schedule applied to every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; `1` disables retries.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    #[must_use]
    pub const fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Base delay after failed attempt number `attempt` (1-based), capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.multiplier.max(1).saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Base delay plus up to 10% random jitter, still capped.
    #[must_use]
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        let base = self.delay_for(attempt);
        let spread = u64::try_from(base.as_millis() / 10).unwrap_or(u64::MAX);
        if spread == 0 {
            return base;
        }
        let jitter = rand::rng().random_range(0..=spread);
        (base + Duration::from_millis(jitter)).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_then_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for(4), Duration::from_secs(4));
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..8 {
            let base = policy.delay_for(attempt);
            let jittered = policy.jittered_delay_for(attempt);
            assert!(jittered >= base);
            assert!(jittered <= policy.max_backoff);
            assert!(jittered <= base + base / 10);
        }
    }

    #[test]
    fn single_attempt_policy_never_retries() {
        let policy = RetryPolicy::none();
        assert!(!policy.allows_retry_after(1));
        assert_eq!(policy.delay_for(3), Duration::ZERO);
        assert!(RetryPolicy::default().allows_retry_after(4));
        assert!(!RetryPolicy::default().allows_retry_after(5));
    }
}
