//! Retry policy for failed write batches.

use std::time::Duration;

/// Backoff schedule applied to retryable write failures.
///
/// The delay before attempt `n` (1-based) is
/// `retry_interval * exponential_base^(n-1)` plus a uniformly random jitter
/// in `[0, jitter_interval)`, capped at `max_retry_delay`. A server-supplied
/// `Retry-After` acts as a floor on the computed delay, never a replacement,
/// so a persistently rate-limiting server cannot pin the schedule flat.
///
/// Retrying stops after `max_retries` attempts or once the total time spent
/// on one batch would exceed `max_retry_time`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base delay before the first retry.
    pub retry_interval: Duration,
    /// Maximum number of retries per batch; 0 disables retrying.
    pub max_retries: u32,
    /// Upper bound on a single computed delay.
    pub max_retry_delay: Duration,
    /// Upper bound on the total time spent retrying one batch.
    pub max_retry_time: Duration,
    /// Multiplier applied for each successive retry.
    pub exponential_base: u32,
    /// Width of the random jitter added to each delay.
    pub jitter_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            max_retries: 5,
            max_retry_delay: Duration::from_secs(125),
            max_retry_time: Duration::from_secs(180),
            exponential_base: 2,
            jitter_interval: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Computed delay before the given 1-based retry attempt.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let backoff = self
            .retry_interval
            .saturating_mul(self.exponential_base.saturating_pow(exponent));
        let jitter = self.jitter_interval.mul_f64(rand::random::<f64>());
        backoff.saturating_add(jitter).min(self.max_retry_delay)
    }

    /// Delay for the given retry, honoring a server-requested minimum.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.backoff_delay(retry);
        match retry_after {
            Some(floor) => delay.max(floor),
            None => delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            retry_interval: Duration::from_secs(5),
            max_retries: 5,
            max_retry_delay: Duration::from_secs(125),
            max_retry_time: Duration::from_secs(180),
            exponential_base: 2,
            jitter_interval: Duration::ZERO,
        }
    }

    #[test]
    fn test_exponential_growth() {
        let p = policy();
        assert_eq!(p.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(p.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(p.backoff_delay(3), Duration::from_secs(20));
        assert_eq!(p.backoff_delay(4), Duration::from_secs(40));
        assert_eq!(p.backoff_delay(5), Duration::from_secs(80));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let p = RetryPolicy {
            max_retry_delay: Duration::from_secs(12),
            ..policy()
        };
        assert_eq!(p.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(p.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(p.backoff_delay(3), Duration::from_secs(12));
        assert_eq!(p.backoff_delay(30), Duration::from_secs(12));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let p = RetryPolicy {
            jitter_interval: Duration::from_secs(1),
            ..policy()
        };
        for _ in 0..100 {
            let delay = p.backoff_delay(1);
            assert!(delay >= Duration::from_secs(5));
            assert!(delay < Duration::from_secs(6) + Duration::from_millis(1));
        }
    }

    #[test]
    fn test_retry_after_is_a_floor_not_a_replacement() {
        let p = policy();
        // Larger than the computed backoff: takes over.
        assert_eq!(
            p.delay_for(1, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
        // Smaller than the computed backoff: the schedule wins.
        assert_eq!(
            p.delay_for(3, Some(Duration::from_secs(1))),
            Duration::from_secs(20)
        );
        assert_eq!(p.delay_for(2, None), Duration::from_secs(10));
    }

    #[test]
    fn test_huge_retry_counts_saturate() {
        let p = policy();
        assert_eq!(p.backoff_delay(u32::MAX), p.max_retry_delay);
    }
}
