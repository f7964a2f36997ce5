//! Pluggable handler registry.
//!
//! `register_handler(type, fn)` binds a step type to an async handler.
//! Duplicate registration replaces the prior binding. The handler
//! signature and registry shape mirror a bounded worker pool's
//! activity-handler registration: type-erased boxed futures keyed by
//! a type string, stored behind a `RwLock<HashMap<..>>`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use ocp_schemas::WorkflowStep;

#[derive(Debug, Clone)]
pub struct HandlerError(pub String);

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HandlerError {}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StepInvocation {
    pub step: WorkflowStep,
    pub input: Value,
    pub context: Value,
}

pub type HandlerResult = Result<Value, HandlerError>;

pub type HandlerFn = Arc<
    dyn Fn(StepInvocation) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync,
>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: std::sync::RwLock<HashMap<String, HandlerFn>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&self, step_type: &str, handler: F)
    where
        F: Fn(StepInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let boxed: HandlerFn = Arc::new(move |invocation| Box::pin(handler(invocation)));
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .insert(step_type.to_string(), boxed);
    }

    pub fn get(&self, step_type: &str) -> Option<HandlerFn> {
        self.handlers
            .read()
            .expect("handler registry lock poisoned")
            .get(step_type)
            .cloned()
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.handlers
            .read()
            .expect("handler registry lock poisoned")
            .contains_key(step_type)
    }
}
