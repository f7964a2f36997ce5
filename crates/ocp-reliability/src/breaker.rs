//! Per-resource circuit breaker: a three-state machine with timed
//! recovery probing.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ocp_schemas::CircuitBreakerState;
use parking_lot::RwLock;

use crate::observer::Observer;

pub use ocp_schemas::CircuitState;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: std::time::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    pub fn with_success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    pub fn with_timeout(mut self, d: std::time::Duration) -> Self {
        self.timeout = d;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("circuit '{circuit_name}' is open, retry after {retry_after_ms}ms")]
    Open {
        circuit_name: String,
        retry_after_ms: u64,
    },
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
}

/// A single named circuit. Cheap to clone (shares inner state).
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<Inner>>,
    observer: Arc<dyn Observer>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, observer: Arc<dyn Observer>) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Arc::new(RwLock::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_time: None,
                next_attempt_time: None,
            })),
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Acquire a permit to call the guarded resource, or fail fast if
    /// the circuit is open. `fn` (the guarded call) is never invoked by
    /// this method itself -- the caller invokes it and reports the
    /// outcome via the returned permit.
    pub fn allow(&self) -> Result<CircuitBreakerPermit<'_>, CircuitBreakerError> {
        let now = Utc::now();
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => Ok(CircuitBreakerPermit { breaker: self }),
            CircuitState::HalfOpen => Ok(CircuitBreakerPermit { breaker: self }),
            CircuitState::Open => {
                let next_attempt = inner.next_attempt_time.unwrap_or(now);
                if now >= next_attempt {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.consecutive_successes = 0;
                    Ok(CircuitBreakerPermit { breaker: self })
                } else {
                    let retry_after_ms = (next_attempt - now).num_milliseconds().max(0) as u64;
                    Err(CircuitBreakerError::Open {
                        circuit_name: self.name.clone(),
                        retry_after_ms,
                    })
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.next_attempt_time = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        inner.last_failure_time = Some(now);
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.next_attempt_time =
                        Some(now + ChronoDuration::from_std(self.config.timeout).unwrap_or_default());
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.next_attempt_time =
                    Some(now + ChronoDuration::from_std(self.config.timeout).unwrap_or_default());
                inner.consecutive_successes = 0;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if from != to {
            self.observer.on_state_change(&self.name, from, to);
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.next_attempt_time = None;
    }

    /// A serializable point-in-time view of this circuit, for exposing
    /// breaker health outside the crate (status endpoints, durable
    /// snapshots) without leaking the internal lock.
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.read();
        CircuitBreakerState {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure_time: inner.last_failure_time,
            next_attempt_time: inner.next_attempt_time,
        }
    }
}

/// Proof that [`CircuitBreaker::allow`] granted access. The caller must
/// report the outcome exactly once via [`success`](Self::success) or
/// [`failure`](Self::failure).
pub struct CircuitBreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
}

impl<'a> CircuitBreakerPermit<'a> {
    pub fn success(self) {
        self.breaker.record_success();
    }

    pub fn failure(self) {
        self.breaker.record_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(cfg: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("test", cfg, Arc::new(crate::observer::NoopObserver))
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = breaker(CircuitBreakerConfig::default().with_failure_threshold(3));
        for _ in 0..3 {
            cb.allow().unwrap().failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn open_rejects_without_invoking_caller() {
        let cb = breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_timeout(Duration::from_secs(30)),
        );
        cb.allow().unwrap().failure();
        assert!(matches!(cb.allow(), Err(CircuitBreakerError::Open { .. })));
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let cb = breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_success_threshold(2)
                .with_timeout(Duration::from_millis(0)),
        );
        cb.allow().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        cb.allow().unwrap().success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.allow().unwrap().success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_reopens_on_failure() {
        let cb = breaker(
            CircuitBreakerConfig::default()
                .with_failure_threshold(1)
                .with_timeout(Duration::from_millis(0)),
        );
        cb.allow().unwrap().failure();
        std::thread::sleep(Duration::from_millis(5));
        cb.allow().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn closed_success_resets_failure_counter() {
        let cb = breaker(CircuitBreakerConfig::default().with_failure_threshold(5));
        cb.allow().unwrap().failure();
        cb.allow().unwrap().failure();
        cb.allow().unwrap().success();
        assert_eq!(cb.inner.read().consecutive_failures, 0);
    }

    #[test]
    fn snapshot_reflects_failure_count_and_last_failure_time() {
        let cb = breaker(CircuitBreakerConfig::default().with_failure_threshold(3));
        cb.allow().unwrap().failure();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.name, "test");
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 1);
        assert!(snapshot.last_failure_time.is_some());
    }

    #[test]
    fn reset_forces_closed() {
        let cb = breaker(CircuitBreakerConfig::default().with_failure_threshold(1));
        cb.allow().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
