//! A workflow is an ordered list of step specifications dispatched
//! against a pluggable handler registry.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct StepSpec {
    pub step_id: String,
    pub step_type: String,
    pub input: Value,
    pub retries: u32,
    pub backoff_ms: u64,
    /// For `parallel-for` steps: a dotted path into the run context
    /// that resolves to a JSON array.
    pub foreach: Option<String>,
    /// For `parallel-for` steps: the template applied to each element.
    pub substep: Option<Box<StepSpec>>,
}

impl StepSpec {
    pub fn new(step_id: impl Into<String>, step_type: impl Into<String>, input: Value) -> Self {
        Self {
            step_id: step_id.into(),
            step_type: step_type.into(),
            input,
            retries: 0,
            backoff_ms: 100,
            foreach: None,
            substep: None,
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

    pub fn parallel_for(step_id: impl Into<String>, foreach: impl Into<String>, substep: StepSpec) -> Self {
        Self {
            step_id: step_id.into(),
            step_type: "parallel-for".to_string(),
            input: Value::Null,
            retries: 0,
            backoff_ms: 100,
            foreach: Some(foreach.into()),
            substep: Some(Box::new(substep)),
        }
    }

    pub fn is_parallel_for(&self) -> bool {
        self.step_type == "parallel-for"
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<StepSpec>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }
}
