//! In-memory workflow store, used by tests and single-shot callers
//! that do not need cross-process durability.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use ocp_schemas::{AuditEvent, WorkflowRun, WorkflowRunStatus, WorkflowStep};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::store::{StoreError, WorkflowStore};

#[derive(Default)]
struct State {
    runs: HashMap<Uuid, WorkflowRun>,
    steps: HashMap<Uuid, Vec<WorkflowStep>>,
    events: HashMap<Uuid, Vec<AuditEvent>>,
    next_event_id: i64,
}

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<State>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_run(&self, run: WorkflowRun) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.runs.insert(run.id, run);
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        Ok(self.state.read().runs.get(&run_id).cloned())
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: WorkflowRunStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;
        run.status = status;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn update_run_context(&self, run_id: Uuid, context: serde_json::Value) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;
        run.context = context;
        run.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_step(&self, step: WorkflowStep) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let steps = state.steps.entry(step.run_id).or_default();
        if let Some(existing) = steps.iter_mut().find(|s| s.step_id == step.step_id) {
            *existing = step;
        } else {
            steps.push(step);
        }
        Ok(())
    }

    async fn get_step(&self, run_id: Uuid, step_id: &str) -> Result<Option<WorkflowStep>, StoreError> {
        Ok(self
            .state
            .read()
            .steps
            .get(&run_id)
            .and_then(|steps| steps.iter().find(|s| s.step_id == step_id).cloned()))
    }

    async fn get_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        Ok(self.state.read().steps.get(&run_id).cloned().unwrap_or_default())
    }

    async fn append_event(&self, mut event: AuditEvent) -> Result<i64, StoreError> {
        let mut state = self.state.write();
        state.next_event_id += 1;
        event.id = state.next_event_id;
        let run_id = event.run_id;
        state.events.entry(run_id).or_default().push(event);
        Ok(state.next_event_id)
    }

    async fn get_events(&self, run_id: Uuid) -> Result<Vec<AuditEvent>, StoreError> {
        Ok(self.state.read().events.get(&run_id).cloned().unwrap_or_default())
    }

    async fn commit_step_transition(
        &self,
        step: WorkflowStep,
        context: Option<serde_json::Value>,
        run_status: Option<WorkflowRunStatus>,
        mut event: AuditEvent,
    ) -> Result<i64, StoreError> {
        let mut state = self.state.write();

        if context.is_some() || run_status.is_some() {
            if !state.runs.contains_key(&step.run_id) {
                return Err(StoreError::RunNotFound(step.run_id));
            }
        }

        let steps = state.steps.entry(step.run_id).or_default();
        if let Some(existing) = steps.iter_mut().find(|s| s.step_id == step.step_id) {
            *existing = step.clone();
        } else {
            steps.push(step.clone());
        }

        if context.is_some() || run_status.is_some() {
            let run = state
                .runs
                .get_mut(&step.run_id)
                .expect("existence checked above");
            if let Some(context) = context {
                run.context = context;
            }
            if let Some(status) = run_status {
                run.status = status;
            }
            run.updated_at = Utc::now();
        }

        state.next_event_id += 1;
        event.id = state.next_event_id;
        state.events.entry(event.run_id).or_default().push(event);
        Ok(state.next_event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_and_get_run_round_trips() {
        let store = InMemoryWorkflowStore::new();
        let run = WorkflowRun::new("demo", json!({}));
        let id = run.id;
        store.create_run(run).await.unwrap();
        let fetched = store.get_run(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn upsert_step_replaces_by_step_id() {
        let store = InMemoryWorkflowStore::new();
        let run_id = Uuid::now_v7();
        let mut step = WorkflowStep::new(run_id, "a", "noop");
        store.upsert_step(step.clone()).await.unwrap();
        step.attempts = 1;
        store.upsert_step(step).await.unwrap();
        let steps = store.get_steps(run_id).await.unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].attempts, 1);
    }

    #[tokio::test]
    async fn append_event_assigns_monotonic_ids() {
        let store = InMemoryWorkflowStore::new();
        let run_id = Uuid::now_v7();
        let id1 = store
            .append_event(AuditEvent::new(0, run_id, "a", json!(null)))
            .await
            .unwrap();
        let id2 = store
            .append_event(AuditEvent::new(0, run_id, "b", json!(null)))
            .await
            .unwrap();
        assert!(id2 > id1);
        let events = store.get_events(run_id).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn update_status_on_unknown_run_fails() {
        let store = InMemoryWorkflowStore::new();
        let result = store
            .update_run_status(Uuid::now_v7(), WorkflowRunStatus::Failed)
            .await;
        assert!(matches!(result, Err(StoreError::RunNotFound(_))));
    }

    #[tokio::test]
    async fn commit_step_transition_applies_step_context_status_and_event_together() {
        let store = InMemoryWorkflowStore::new();
        let run = WorkflowRun::new("demo", json!({}));
        let run_id = run.id;
        store.create_run(run).await.unwrap();

        let mut step = WorkflowStep::new(run_id, "a", "noop");
        step.status = WorkflowStepStatus::Completed;

        let event_id = store
            .commit_step_transition(
                step,
                Some(json!({"a": true})),
                Some(WorkflowRunStatus::Completed),
                AuditEvent::new(0, run_id, "step_completed", json!(null)),
            )
            .await
            .unwrap();
        assert_eq!(event_id, 1);

        let run = store.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, WorkflowRunStatus::Completed);
        assert_eq!(run.context, json!({"a": true}));
        assert_eq!(store.get_events(run_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_step_transition_on_unknown_run_leaves_no_partial_writes() {
        let store = InMemoryWorkflowStore::new();
        let run_id = Uuid::now_v7();
        let step = WorkflowStep::new(run_id, "a", "noop");

        let result = store
            .commit_step_transition(
                step,
                Some(json!({})),
                None,
                AuditEvent::new(0, run_id, "step_completed", json!(null)),
            )
            .await;
        assert!(matches!(result, Err(StoreError::RunNotFound(_))));
        assert!(store.get_steps(run_id).await.unwrap().is_empty());
        assert!(store.get_events(run_id).await.unwrap().is_empty());
    }
}
