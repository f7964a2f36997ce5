//! Workflow Engine: durable step execution with idempotent resume,
//! per-step retry/backoff, and bounded parallel fan-out.

pub mod cancellation;
pub mod definition;
pub mod engine;
pub mod handler;

pub use cancellation::CancellationHandle;
pub use definition::{StepSpec, WorkflowDefinition};
pub use engine::{RunResult, RunState, WorkflowEngine, WorkflowEngineConfig, WorkflowError};
pub use handler::{HandlerError, HandlerFn, StepInvocation};
