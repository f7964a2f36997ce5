//! Composes the five core subsystems.
//!
//! A task enters here, is enriched with a quota signal, routed by the
//! strategy orchestrator, and (for multi-step tasks) handed to the
//! workflow engine. Circuit breakers guard whatever the caller's
//! handlers actually call; this layer does not itself perform model
//! inference (out of scope).

use std::sync::Arc;

use ocp_reliability::{CircuitBreakerConfig, CircuitBreakerRegistry};
use ocp_quota::QuotaManager;
use ocp_schemas::{QuotaFactor, QuotaStatus, RoutingDecision};
use ocp_strategy::{Orchestrator, Task};
use ocp_workflow::WorkflowEngine;
use uuid::Uuid;

use crate::config::Config;
use crate::learning::LearningChannel;
use crate::observer::IntegrationObserver;

#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub model: Option<String>,
    pub strategy: String,
    pub reason: String,
    pub fallback_applied: bool,
}

/// Owns and wires together the quota manager, circuit breaker
/// registry, strategy orchestrator, and workflow engine. The plugin
/// supervisor runs independently and is held separately by callers
/// that schedule its evaluation cycles.
pub struct ControlPlane {
    pub config: Config,
    pub quota: Arc<QuotaManager>,
    pub circuits: Arc<CircuitBreakerRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub workflow: Arc<WorkflowEngine>,
    pub observer: Arc<IntegrationObserver>,
    learning: LearningChannel,
}

impl ControlPlane {
    pub fn new(
        config: Config,
        quota: Arc<QuotaManager>,
        orchestrator: Arc<Orchestrator>,
        workflow: Arc<WorkflowEngine>,
    ) -> Self {
        let observer = IntegrationObserver::new();
        let circuits = Arc::new(CircuitBreakerRegistry::new(observer.clone()));
        let learning = LearningChannel::new(config.skill_rl_path());
        Self {
            config,
            quota,
            circuits,
            orchestrator,
            workflow,
            observer,
            learning,
        }
    }

    pub fn circuit_for(&self, resource: &str) -> Arc<ocp_reliability::CircuitBreaker> {
        self.circuits.get(resource, CircuitBreakerConfig::default())
    }

    /// Enriches `task` with a quota signal for `requested_provider`,
    /// falls back to a healthy candidate when the requested provider is
    /// beyond its critical threshold and `allow_fallback` is set, then
    /// delegates to the strategy orchestrator. Always persists a
    /// `RoutingDecision`.
    pub fn route(&self, task: &Task, requested_provider: &str, allow_fallback: bool) -> RouteOutcome {
        let snapshot = self.quota.get_quota_status(requested_provider);

        let mut quota_factors = Vec::new();
        let mut effective_provider = requested_provider.to_string();
        let mut fallback_applied = false;

        if let Some(snapshot) = &snapshot {
            quota_factors.push(QuotaFactor {
                provider: requested_provider.to_string(),
                reason: format!("{:?}", snapshot.status).to_lowercase(),
                percent: snapshot.percent_used,
            });

            let beyond_critical = matches!(snapshot.status, QuotaStatus::Critical | QuotaStatus::Exhausted);
            if beyond_critical && allow_fallback {
                if let Some((candidate, percent, status)) = self
                    .quota
                    .suggest_fallback(&[requested_provider.to_string()])
                    .into_iter()
                    .next()
                {
                    quota_factors.push(QuotaFactor {
                        provider: candidate.clone(),
                        reason: format!("{status:?}").to_lowercase(),
                        percent,
                    });
                    effective_provider = candidate;
                    fallback_applied = true;
                }
            }
        }

        let context = serde_json::json!({ "provider": effective_provider });
        let selection = self.orchestrator.select(task, &context);

        let reason = if fallback_applied {
            format!(
                "{} fallback_from:{} fallback_to:{}",
                selection.reason, requested_provider, effective_provider
            )
        } else {
            selection.reason.clone()
        };

        self.quota.log_routing_decision(RoutingDecision {
            id: Uuid::now_v7(),
            session_id: None,
            task_id: None,
            requested_category: task.category.clone(),
            requested_skills: task.skills.clone(),
            original_selection: Some(requested_provider.to_string()),
            final_selection: selection.model.clone(),
            quota_factors,
            fallback_applied,
            reason: reason.clone(),
            timestamp: chrono::Utc::now(),
        });

        let outcome = if selection.model.is_some() {
            self.learning.record_success()
        } else {
            self.learning.record_failure(&selection.strategy, &reason)
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "failed to persist learning channel update");
        }

        RouteOutcome {
            model: selection.model,
            strategy: selection.strategy,
            reason,
            fallback_applied,
        }
    }
}
