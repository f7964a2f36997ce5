//! Workflow Engine data model (run, step, audit event).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub name: String,
    pub status: WorkflowRunStatus,
    pub input: Value,
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            status: WorkflowRunStatus::Running,
            input,
            context: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Composite key is `(run_id, step_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub run_id: Uuid,
    pub step_id: String,
    pub step_type: String,
    pub status: WorkflowStepStatus,
    /// Counts retries, not total tries. Initial try is attempt 0.
    pub attempts: u32,
    pub retries: u32,
    pub backoff_ms: u64,
    /// Present iff status is Completed or Failed.
    pub result: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowStep {
    pub fn new(run_id: Uuid, step_id: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            run_id,
            step_id: step_id.into(),
            step_type: step_type.into(),
            status: WorkflowStepStatus::Pending,
            attempts: 0,
            retries: 0,
            backoff_ms: 100,
            result: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub run_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(id: i64, run_id: Uuid, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id,
            run_id,
            event_type: event_type.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_running_with_empty_context() {
        let run = WorkflowRun::new("demo", Value::Null);
        assert_eq!(run.status, WorkflowRunStatus::Running);
        assert_eq!(run.context, Value::Object(Default::default()));
    }

    #[test]
    fn new_step_starts_pending_with_zero_attempts() {
        let step = WorkflowStep::new(Uuid::now_v7(), "a", "noop");
        assert_eq!(step.status, WorkflowStepStatus::Pending);
        assert_eq!(step.attempts, 0);
        assert!(step.result.is_none());
    }
}
