//! Typed observer wiring across subsystems.
//!
//! A single `Observer` implementation is injected at construction into
//! the circuit breaker registry; its hook errors never propagate into
//! the breaker's transition logic.

use std::sync::Arc;

use ocp_reliability::breaker::CircuitState;
use ocp_reliability::Observer;
use parking_lot::Mutex;

/// Records circuit-breaker transitions for the integration layer's own
/// diagnostics, and logs them via `tracing`.
pub struct IntegrationObserver {
    transitions: Mutex<Vec<(String, CircuitState, CircuitState)>>,
}

impl Default for IntegrationObserver {
    fn default() -> Self {
        Self {
            transitions: Mutex::new(Vec::new()),
        }
    }
}

impl IntegrationObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn transitions(&self) -> Vec<(String, CircuitState, CircuitState)> {
        self.transitions.lock().clone()
    }
}

impl Observer for IntegrationObserver {
    fn on_state_change(&self, name: &str, from: CircuitState, to: CircuitState) {
        tracing::info!(circuit = name, %from, %to, "circuit breaker transition");
        self.transitions.lock().push((name.to_string(), from, to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_transitions_without_panicking() {
        let observer = IntegrationObserver::new();
        observer.on_state_change("svc", CircuitState::Closed, CircuitState::Open);
        assert_eq!(observer.transitions().len(), 1);
    }
}
