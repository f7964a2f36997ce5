//! Typed observer interface, replacing dynamic event emitters.
//!
//! Components publish state transitions through this interface rather
//! than an ad-hoc callback bag. Implementations must not let errors
//! escape into the caller's control flow; the registry only ever calls
//! these methods for their side effects and ignores any panic-free
//! failure internally.

use crate::breaker::CircuitState;

pub trait Observer: Send + Sync {
    /// Called after a circuit breaker completes a state transition.
    fn on_state_change(&self, name: &str, from: CircuitState, to: CircuitState) {
        let _ = (name, from, to);
    }
}

/// An observer that does nothing; the default when no caller wires one in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
