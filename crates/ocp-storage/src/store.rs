//! The workflow durable store contract.
//!
//! All writes within one step transition (status change, attempt
//! increment, result write, audit event append) must occur in one
//! atomic transaction.

use async_trait::async_trait;
use ocp_schemas::{AuditEvent, WorkflowRun, WorkflowRunStatus, WorkflowStep};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Database(String),
    #[error("run not found: {0}")]
    RunNotFound(Uuid),
    #[error("step not found: {run_id}/{step_id}")]
    StepNotFound { run_id: Uuid, step_id: String },
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create_run(&self, run: WorkflowRun) -> Result<(), StoreError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError>;

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: WorkflowRunStatus,
    ) -> Result<(), StoreError>;

    async fn update_run_context(&self, run_id: Uuid, context: Value) -> Result<(), StoreError>;

    /// Upserts a step. Implementations persist the full step transition
    /// (status, attempts, result, updated_at) atomically.
    async fn upsert_step(&self, step: WorkflowStep) -> Result<(), StoreError>;

    async fn get_step(&self, run_id: Uuid, step_id: &str) -> Result<Option<WorkflowStep>, StoreError>;

    /// Returns all steps for a run in the order they were first created.
    async fn get_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError>;

    async fn append_event(&self, event: AuditEvent) -> Result<i64, StoreError>;

    async fn get_events(&self, run_id: Uuid) -> Result<Vec<AuditEvent>, StoreError>;

    /// Commits a step's terminal write together with the run-level side
    /// effects of that transition (a context merge, a run status change,
    /// and the audit event) in one atomic transaction. This is what
    /// `execute()` calls instead of issuing `upsert_step`,
    /// `update_run_context`/`update_run_status`, and `append_event`
    /// independently, per this module's atomicity requirement.
    async fn commit_step_transition(
        &self,
        step: WorkflowStep,
        context: Option<Value>,
        run_status: Option<WorkflowRunStatus>,
        event: AuditEvent,
    ) -> Result<i64, StoreError>;
}
