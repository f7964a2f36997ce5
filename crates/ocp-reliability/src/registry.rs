//! Registry of circuit breakers, one per guarded resource.

use std::collections::HashMap;
use std::sync::Arc;

use ocp_schemas::CircuitBreakerState;
use parking_lot::RwLock;

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::observer::{NoopObserver, Observer};

#[derive(Debug, Default, Clone, Copy)]
pub struct CircuitSummary {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
}

/// Memoizes breakers by name. Pass explicitly rather than reaching for
/// a process-wide global; `Default` is provided only for convenience at
/// call sites that do not need shared health-tracking across registries.
pub struct CircuitBreakerRegistry {
    observer: Arc<dyn Observer>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(NoopObserver))
    }
}

impl CircuitBreakerRegistry {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self {
            observer,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Memoizes a breaker for `name`; subsequent calls with the same
    /// name return the same breaker regardless of `config`.
    pub fn get(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return existing.clone();
        }
        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config, self.observer.clone())))
            .clone()
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }

    pub fn summary(&self) -> CircuitSummary {
        let mut summary = CircuitSummary::default();
        for breaker in self.breakers.read().values() {
            match breaker.state() {
                CircuitState::Closed => summary.closed += 1,
                CircuitState::Open => summary.open += 1,
                CircuitState::HalfOpen => summary.half_open += 1,
            }
        }
        summary
    }

    /// Per-circuit detail complementing [`summary`](Self::summary)'s
    /// counts-only aggregation.
    pub fn snapshots(&self) -> Vec<CircuitBreakerState> {
        self.breakers.read().values().map(|b| b.snapshot()).collect()
    }
}
