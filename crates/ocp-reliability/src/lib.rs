//! Circuit breaker registry and retry policy.
//!
//! Adapted from a distributed, store-backed circuit breaker into an
//! in-process one: this system is single-process by design (no
//! clustered coordination), so breaker state lives behind a
//! `parking_lot::RwLock` instead of a shared durable store.

pub mod breaker;
pub mod observer;
pub mod registry;
pub mod retry;

pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerPermit, CircuitState,
};
pub use observer::Observer;
pub use ocp_schemas::CircuitBreakerState;
pub use registry::{CircuitBreakerRegistry, CircuitSummary};
pub use retry::RetryPolicy;
