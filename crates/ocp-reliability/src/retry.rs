//! Exponential backoff retry policy.
//!
//! `attempts` in the workflow step model counts retries only: the
//! initial dispatch is attempt 0, and [`delay_for_attempt`](RetryPolicy::delay_for_attempt)
//! is only ever called ahead of a *re*-dispatch.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_coefficient: f64,
    /// Jitter as a fraction of the computed delay, e.g. 0.1 = +/-10%.
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, initial_interval: Duration) -> Self {
        Self {
            max_retries,
            initial_interval,
            max_interval: Duration::from_secs(60),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_interval: Duration::from_millis(0),
            max_interval: Duration::from_millis(0),
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn fixed(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// `attempts` is the number of retries already made (0 before the
    /// first retry). The delay returned precedes the `attempts+1`-th
    /// retry, i.e. `backoff * coefficient^attempts`, capped at
    /// `max_interval`, then perturbed by jitter.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let base_ms = self.initial_interval.as_millis() as f64
            * self.backoff_coefficient.powi(attempts as i32);
        let capped_ms = base_ms.min(self.max_interval.as_millis() as f64);

        let jittered_ms = if self.jitter > 0.0 {
            let jitter_range = capped_ms * self.jitter;
            let delta = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_ms + delta).max(0.0)
        } else {
            capped_ms
        };

        Duration::from_millis(jittered_ms.round_to_u64())
    }

    pub fn has_attempts_remaining(&self, attempts: u32) -> bool {
        attempts < self.max_retries
    }
}

trait RoundToU64 {
    fn round_to_u64(self) -> u64;
}

impl RoundToU64 for f64 {
    fn round_to_u64(self) -> u64 {
        self.round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retry_has_zero_retries_remaining() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.has_attempts_remaining(0));
    }

    #[test]
    fn exponential_grows_with_attempts() {
        let policy = RetryPolicy::exponential(5, Duration::from_millis(100)).with_jitter(0.0);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped_at_max_interval() {
        let policy = RetryPolicy::exponential(10, Duration::from_millis(1000))
            .with_max_interval(Duration::from_millis(1500))
            .with_jitter(0.0);
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(1500));
    }

    #[test]
    fn has_attempts_remaining_respects_max_retries() {
        let policy = RetryPolicy::exponential(2, Duration::from_millis(10));
        assert!(policy.has_attempts_remaining(0));
        assert!(policy.has_attempts_remaining(1));
        assert!(!policy.has_attempts_remaining(2));
    }
}
