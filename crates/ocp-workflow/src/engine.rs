//! The workflow engine: executes an ordered list of steps against the
//! handler registry, guaranteeing idempotent resume after crash and
//! bounded retries per step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ocp_reliability::RetryPolicy;
use ocp_schemas::{AuditEvent, WorkflowRun, WorkflowRunStatus, WorkflowStep, WorkflowStepStatus};
use ocp_storage::{StoreError, WorkflowStore};
use serde_json::Value;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::cancellation::CancellationHandle;
use crate::definition::{StepSpec, WorkflowDefinition};
use crate::handler::{HandlerError, HandlerRegistry, StepInvocation};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("handler error: {0}")]
    Handler(HandlerError),
    #[error("no handler registered for step type: {0}")]
    HandlerNotFound(String),
    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub run_id: Uuid,
    pub status: WorkflowRunStatus,
}

#[derive(Debug, Clone)]
pub struct RunState {
    pub run: WorkflowRun,
    pub steps: Vec<WorkflowStep>,
    pub events: Vec<AuditEvent>,
}

#[derive(Debug, Clone)]
pub struct WorkflowEngineConfig {
    pub parallel_concurrency: usize,
    pub max_backoff_ms: u64,
}

impl Default for WorkflowEngineConfig {
    fn default() -> Self {
        Self {
            parallel_concurrency: 10,
            max_backoff_ms: 30_000,
        }
    }
}

pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    handlers: HandlerRegistry,
    config: WorkflowEngineConfig,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, config: WorkflowEngineConfig) -> Self {
        Self {
            store,
            handlers: HandlerRegistry::new(),
            config,
        }
    }

    pub fn register_handler<F, Fut>(&self, step_type: &str, handler: F)
    where
        F: Fn(StepInvocation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.handlers.register(step_type, handler);
    }

    /// Allocates a fresh run identifier and writes a running
    /// `WorkflowRun`. Fails only on storage error.
    pub async fn create_run(&self, name: &str, input: Value) -> Result<Uuid, WorkflowError> {
        let run = WorkflowRun::new(name, input);
        let id = run.id;
        self.store.create_run(run).await?;
        Ok(id)
    }

    #[tracing::instrument(skip(self, workflow, input, cancel))]
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        input: Value,
        run_id: Option<Uuid>,
        cancel: Option<CancellationHandle>,
    ) -> Result<RunResult, WorkflowError> {
        let run_id = self.resolve_run(workflow, input, run_id).await?;
        self.ensure_step_records(run_id, workflow).await?;

        for spec in &workflow.steps {
            if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return self.fail_run_cancelled(run_id).await;
            }

            let mut step = self
                .store
                .get_step(run_id, &spec.step_id)
                .await?
                .expect("step record created in ensure_step_records");

            if step.status == WorkflowStepStatus::Completed {
                tracing::debug!(step_id = %spec.step_id, "skipping already-completed step");
                continue;
            }

            if step.status == WorkflowStepStatus::Running {
                step.status = WorkflowStepStatus::Pending;
                step.updated_at = Utc::now();
                self.store.upsert_step(step.clone()).await?;
            }

            let run = self.current_run(run_id).await?;
            let context = run.context.clone();

            let (step, outcome) = if spec.is_parallel_for() {
                self.run_parallel_for(run_id, spec, &context).await
            } else {
                self.run_step(run_id, spec, &context).await
            };

            match outcome {
                Ok(result) => {
                    let mut merged = context;
                    merge_context(&mut merged, &spec.step_id, &result);
                    self.store
                        .commit_step_transition(
                            step,
                            Some(merged),
                            None,
                            AuditEvent::new(
                                0,
                                run_id,
                                "step_completed",
                                serde_json::json!({ "step_id": spec.step_id }),
                            ),
                        )
                        .await?;
                }
                Err(error) => {
                    self.store
                        .commit_step_transition(
                            step,
                            None,
                            Some(WorkflowRunStatus::Failed),
                            AuditEvent::new(
                                0,
                                run_id,
                                "step_failed",
                                serde_json::json!({ "step_id": spec.step_id, "error": error.0 }),
                            ),
                        )
                        .await?;
                    return Err(WorkflowError::Handler(error));
                }
            }
        }

        self.store
            .update_run_status(run_id, WorkflowRunStatus::Completed)
            .await?;
        Ok(RunResult {
            run_id,
            status: WorkflowRunStatus::Completed,
        })
    }

    pub async fn get_run_state(&self, run_id: Uuid) -> Result<RunState, WorkflowError> {
        let run = self
            .store
            .get_run(run_id)
            .await?
            .ok_or(StoreError::RunNotFound(run_id))?;
        let steps = self.store.get_steps(run_id).await?;
        let events = self.store.get_events(run_id).await?;
        Ok(RunState { run, steps, events })
    }

    async fn resolve_run(
        &self,
        workflow: &WorkflowDefinition,
        input: Value,
        run_id: Option<Uuid>,
    ) -> Result<Uuid, WorkflowError> {
        if let Some(id) = run_id {
            if self.store.get_run(id).await?.is_some() {
                return Ok(id);
            }
        }
        self.create_run(&workflow.name, input).await
    }

    async fn ensure_step_records(
        &self,
        run_id: Uuid,
        workflow: &WorkflowDefinition,
    ) -> Result<(), WorkflowError> {
        for spec in &workflow.steps {
            if self.store.get_step(run_id, &spec.step_id).await?.is_none() {
                let step = WorkflowStep::new(run_id, spec.step_id.clone(), spec.step_type.clone())
                    .with_retries(spec.retries)
                    .with_backoff_ms(spec.backoff_ms);
                self.store.upsert_step(step).await?;
            }
        }
        Ok(())
    }

    async fn current_run(&self, run_id: Uuid) -> Result<WorkflowRun, WorkflowError> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::Storage(StoreError::RunNotFound(run_id)))
    }

    async fn fail_run_cancelled(&self, run_id: Uuid) -> Result<RunResult, WorkflowError> {
        self.store
            .update_run_status(run_id, WorkflowRunStatus::Failed)
            .await?;
        self.store
            .append_event(AuditEvent::new(
                0,
                run_id,
                "run_cancelled",
                serde_json::json!({ "reason": "cancelled" }),
            ))
            .await?;
        Ok(RunResult {
            run_id,
            status: WorkflowRunStatus::Failed,
        })
    }

    /// Runs a single (non-`parallel-for`) step's handler with retries per
    /// its declared policy, persisting the `Running` transition as it
    /// starts but leaving the terminal write to the caller, which
    /// commits it atomically alongside whatever run-level side effects
    /// accompany this step. `attempts` counts retries only: the first
    /// dispatch is attempt 0 and is not itself a retry.
    async fn run_step(
        &self,
        run_id: Uuid,
        spec: &StepSpec,
        context: &Value,
    ) -> (WorkflowStep, Result<Value, HandlerError>) {
        let mut step = self
            .store
            .get_step(run_id, &spec.step_id)
            .await
            .unwrap_or(None)
            .unwrap_or_else(|| WorkflowStep::new(run_id, &spec.step_id, &spec.step_type));

        let handler = match self.handlers.get(&spec.step_type) {
            Some(h) => h,
            None => {
                return (
                    step,
                    Err(HandlerError(format!("no handler registered for type '{}'", spec.step_type))),
                )
            }
        };

        let policy = RetryPolicy::exponential(spec.retries, Duration::from_millis(spec.backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms));

        step.status = WorkflowStepStatus::Running;
        step.updated_at = Utc::now();
        let _ = self.store.upsert_step(step.clone()).await;

        loop {
            let invocation = StepInvocation {
                step: step.clone(),
                input: spec.input.clone(),
                context: context.clone(),
            };

            match handler(invocation).await {
                Ok(result) => {
                    step.status = WorkflowStepStatus::Completed;
                    step.result = Some(result.clone());
                    step.updated_at = Utc::now();
                    return (step, Ok(result));
                }
                Err(error) => {
                    if policy.has_attempts_remaining(step.attempts) {
                        step.attempts += 1;
                        let delay = policy.delay_for_attempt(step.attempts - 1);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    step.status = WorkflowStepStatus::Failed;
                    step.result = Some(serde_json::json!({ "error": error.0 }));
                    step.updated_at = Utc::now();
                    return (step, Err(error));
                }
            }
        }
    }

    /// `parallel-for` children self-persist: they have no run-level
    /// context merge or audit event to bundle their terminal write with.
    async fn dispatch_step(
        &self,
        run_id: Uuid,
        spec: &StepSpec,
        context: &Value,
    ) -> Result<Value, HandlerError> {
        let (step, outcome) = self.run_step(run_id, spec, context).await;
        let _ = self.store.upsert_step(step).await;
        outcome
    }

    /// Like [`run_step`](Self::run_step), but for the `parallel-for`
    /// fanout step itself: runs every child to completion, then returns
    /// the parent step record (so it reaches a terminal status instead
    /// of being left `Pending` forever) for the caller to commit.
    async fn run_parallel_for(
        &self,
        run_id: Uuid,
        spec: &StepSpec,
        context: &Value,
    ) -> (WorkflowStep, Result<Value, HandlerError>) {
        let mut parent = self
            .store
            .get_step(run_id, &spec.step_id)
            .await
            .unwrap_or(None)
            .unwrap_or_else(|| WorkflowStep::new(run_id, &spec.step_id, &spec.step_type));

        parent.status = WorkflowStepStatus::Running;
        parent.updated_at = Utc::now();
        let _ = self.store.upsert_step(parent.clone()).await;

        match self.dispatch_parallel_for(run_id, spec, context).await {
            Ok(result) => {
                parent.status = WorkflowStepStatus::Completed;
                parent.result = Some(result.clone());
                parent.updated_at = Utc::now();
                (parent, Ok(result))
            }
            Err(error) => {
                parent.status = WorkflowStepStatus::Failed;
                parent.result = Some(serde_json::json!({ "error": error.0 }));
                parent.updated_at = Utc::now();
                (parent, Err(error))
            }
        }
    }

    /// `parallel-for`: resolves `foreach` against a dotted path into
    /// the run context, materializes `<parent>:<index>` children, and
    /// dispatches them with a bounded concurrency cap. The parent
    /// completes only when every child completes; any child failure
    /// fails the parent after its own (zero by default) retries.
    async fn dispatch_parallel_for(
        &self,
        run_id: Uuid,
        spec: &StepSpec,
        context: &Value,
    ) -> Result<Value, HandlerError> {
        let foreach_path = spec
            .foreach
            .as_deref()
            .ok_or_else(|| HandlerError("parallel-for step missing foreach path".to_string()))?;
        let substep_template = spec
            .substep
            .as_deref()
            .ok_or_else(|| HandlerError("parallel-for step missing substep template".to_string()))?;

        let items = resolve_foreach(context, foreach_path)
            .ok_or_else(|| HandlerError(format!("foreach path '{foreach_path}' did not resolve to an array")))?;

        let semaphore = Arc::new(Semaphore::new(self.config.parallel_concurrency.max(1)));
        let mut tasks = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let child_spec = StepSpec {
                step_id: format!("{}:{}", spec.step_id, index),
                step_type: substep_template.step_type.clone(),
                input: item,
                retries: substep_template.retries,
                backoff_ms: substep_template.backoff_ms,
                foreach: None,
                substep: None,
            };
            let context = context.clone();

            tasks.push(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                self.dispatch_step(run_id, &child_spec, &context).await
            });
        }

        let results = futures::future::join_all(tasks).await;
        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            outputs.push(result?);
        }
        Ok(Value::Array(outputs))
    }
}

fn merge_context(context: &mut Value, step_id: &str, result: &Value) {
    if !context.is_object() {
        *context = Value::Object(Default::default());
    }
    context
        .as_object_mut()
        .expect("coerced to object above")
        .insert(step_id.to_string(), result.clone());
}

/// Resolves a dotted path (e.g. `"items"` or `"a.b.items"`) against the
/// run context into a JSON array.
fn resolve_foreach(context: &Value, path: &str) -> Option<Vec<Value>> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    current.as_array().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocp_storage::InMemoryWorkflowStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn engine() -> WorkflowEngine {
        WorkflowEngine::new(Arc::new(InMemoryWorkflowStore::new()), WorkflowEngineConfig::default())
    }

    /// S1 -- idempotent resume: a completed step's handler must not be
    /// invoked again, and pending steps run exactly once.
    #[tokio::test]
    async fn s1_idempotent_resume_skips_completed_steps() {
        let engine = engine();
        let calls_a = Arc::new(AtomicU32::new(0));
        let calls_b = Arc::new(AtomicU32::new(0));
        let calls_c = Arc::new(AtomicU32::new(0));

        {
            let calls_a = calls_a.clone();
            engine.register_handler("noop", move |inv: StepInvocation| {
                let calls_a = calls_a.clone();
                async move {
                    if inv.step.step_id == "a" {
                        calls_a.fetch_add(1, Ordering::SeqCst);
                        return Ok(serde_json::json!({ "ok": 1 }));
                    }
                    Ok(Value::Null)
                }
            });
        }

        let workflow = WorkflowDefinition::new(
            "demo",
            vec![
                StepSpec::new("a", "noop", Value::Null),
                StepSpec::new("b", "noop", Value::Null),
                StepSpec::new("c", "noop", Value::Null),
            ],
        );

        let run_id = engine.create_run("demo", Value::Null).await.unwrap();
        engine
            .ensure_step_records(run_id, &workflow)
            .await
            .unwrap();

        // Seed: A already completed.
        let mut a = engine.store.get_step(run_id, "a").await.unwrap().unwrap();
        a.status = WorkflowStepStatus::Completed;
        a.result = Some(serde_json::json!({ "ok": 1 }));
        engine.store.upsert_step(a).await.unwrap();

        engine.register_handler("noop2", |_| async { Ok(Value::Null) });
        let _ = (&calls_b, &calls_c);

        let result = engine
            .execute(&workflow, Value::Null, Some(run_id), None)
            .await
            .unwrap();

        assert_eq!(result.status, WorkflowRunStatus::Completed);
        assert_eq!(calls_a.load(Ordering::SeqCst), 0);

        let state = engine.get_run_state(run_id).await.unwrap();
        assert!(state
            .steps
            .iter()
            .all(|s| s.status == WorkflowStepStatus::Completed));
    }

    /// S2 -- retry with backoff: handler fails twice then succeeds;
    /// invoked 3 times total, `attempts == 2` (retries-only).
    #[tokio::test]
    async fn s2_retry_with_backoff_counts_retries_only() {
        let engine = engine();
        let calls = Arc::new(AtomicU32::new(0));

        {
            let calls = calls.clone();
            engine.register_handler("flaky", move |_inv: StepInvocation| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(HandlerError("transient".to_string()))
                    } else {
                        Ok(serde_json::json!({ "ok": true }))
                    }
                }
            });
        }

        let workflow = WorkflowDefinition::new(
            "demo",
            vec![StepSpec::new("x", "flaky", Value::Null)
                .with_retries(2)
                .with_backoff_ms(10)],
        );

        let start = std::time::Instant::now();
        let result = engine.execute(&workflow, Value::Null, None, None).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(result.status, WorkflowRunStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_millis(10));

        let state = engine.get_run_state(result.run_id).await.unwrap();
        let step = state.steps.iter().find(|s| s.step_id == "x").unwrap();
        assert_eq!(step.attempts, 2);
        assert_eq!(step.status, WorkflowStepStatus::Completed);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_step_failed_not_running() {
        let engine = engine();
        engine.register_handler("always_fail", |_: StepInvocation| async {
            Err(HandlerError("nope".to_string()))
        });

        let run_id = engine.create_run("demo", Value::Null).await.unwrap();
        let workflow = WorkflowDefinition::new(
            "demo",
            vec![StepSpec::new("x", "always_fail", Value::Null)],
        );
        let result = engine
            .execute(&workflow, Value::Null, Some(run_id), None)
            .await;
        assert!(matches!(result, Err(WorkflowError::Handler(_))));

        let state = engine.get_run_state(run_id).await.unwrap();
        let step = state.steps.iter().find(|s| s.step_id == "x").unwrap();
        assert_eq!(step.status, WorkflowStepStatus::Failed);
    }

    #[tokio::test]
    async fn completed_step_never_transitions_again() {
        let engine = engine();
        engine.register_handler("noop", |_: StepInvocation| async { Ok(Value::Null) });
        let workflow = WorkflowDefinition::new("demo", vec![StepSpec::new("a", "noop", Value::Null)]);
        let result = engine.execute(&workflow, Value::Null, None, None).await.unwrap();

        // Re-running against the same run id must not re-invoke the handler.
        let state_before = engine.get_run_state(result.run_id).await.unwrap();
        let result2 = engine
            .execute(&workflow, Value::Null, Some(result.run_id), None)
            .await
            .unwrap();
        let state_after = engine.get_run_state(result2.run_id).await.unwrap();
        assert_eq!(
            state_before.steps[0].updated_at,
            state_after.steps[0].updated_at
        );
    }

    #[tokio::test]
    async fn parallel_for_fans_out_bounded_and_completes() {
        let engine = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = seen.clone();
            engine.register_handler("square", move |inv: StepInvocation| {
                let seen = seen.clone();
                async move {
                    let n = inv.input.as_i64().unwrap_or(0);
                    seen.lock().unwrap().push(n);
                    Ok(serde_json::json!(n * n))
                }
            });
        }

        let mut context = serde_json::json!({});
        context["items"] = serde_json::json!([1, 2, 3, 4]);

        let run_id = engine.create_run("demo", Value::Null).await.unwrap();
        engine
            .store
            .update_run_context(run_id, context)
            .await
            .unwrap();

        let workflow = WorkflowDefinition::new(
            "demo",
            vec![StepSpec::parallel_for(
                "fanout",
                "items",
                StepSpec::new("child", "square", Value::Null),
            )],
        );

        let result = engine
            .execute(&workflow, Value::Null, Some(run_id), None)
            .await
            .unwrap();
        assert_eq!(result.status, WorkflowRunStatus::Completed);
        assert_eq!(seen.lock().unwrap().len(), 4);

        let state = engine.get_run_state(run_id).await.unwrap();
        let fanout = state.steps.iter().find(|s| s.step_id == "fanout").unwrap();
        assert_eq!(fanout.status, WorkflowStepStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_fails_run_without_starting_new_step() {
        let engine = engine();
        let calls = Arc::new(AtomicU32::new(0));
        {
            let calls = calls.clone();
            engine.register_handler("noop", move |_: StepInvocation| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            });
        }

        let handle = CancellationHandle::new();
        handle.cancel();

        let workflow = WorkflowDefinition::new(
            "demo",
            vec![StepSpec::new("a", "noop", Value::Null)],
        );
        let result = engine
            .execute(&workflow, Value::Null, None, Some(handle))
            .await
            .unwrap();

        assert_eq!(result.status, WorkflowRunStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
