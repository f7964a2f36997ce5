//! The strategy contract.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Task {
    pub category: String,
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
#[error("strategy failed: {0}")]
pub struct StrategyError(pub String);

impl StrategyError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A named selector returning a model for a task, composed with others
/// by priority. Implementations that throw are recorded as a failure
/// by the orchestrator; they never propagate directly to callers.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Higher priority strategies are consulted first.
    fn priority(&self) -> i32;

    /// A strategy may cede without being counted as a failure by
    /// returning `false` here.
    fn should_apply(&self, _task: &Task, _context: &Value) -> bool {
        true
    }

    fn select_model(&self, task: &Task, context: &Value) -> Result<Option<Selection>, StrategyError>;
}
