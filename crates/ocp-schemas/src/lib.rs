//! Shared data model for the orchestration control plane.
//!
//! Every durable record that crosses a component boundary is defined
//! here so that stores, the workflow engine, the quota manager, the
//! strategy orchestrator and the plugin supervisor all serialize the
//! same shapes.

pub mod circuit;
pub mod key_rotator;
pub mod plugin;
pub mod quota;
pub mod strategy;
pub mod version;
pub mod workflow;

pub use circuit::{CircuitBreakerState, CircuitState};
pub use key_rotator::{KeyRecord, KeyRotatorState, KeyStatus};
pub use plugin::{PluginRecord, PluginReasonCode, PluginSample, PluginStatus};
pub use quota::{
    ProviderQuota, QuotaFactor, QuotaPeriod, QuotaSnapshot, QuotaStatus, QuotaType, RoutingDecision,
    UsageRecord,
};
pub use strategy::StrategyHealth;
pub use version::SchemaVersion;
pub use workflow::{AuditEvent, WorkflowRun, WorkflowRunStatus, WorkflowStep, WorkflowStepStatus};
