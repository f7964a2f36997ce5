//! Frozen configuration read once from the environment at startup.
//!
//! All runtime lookups go through this struct rather than re-reading
//! `std::env` ad hoc, per the "ambient configuration via environment"
//! design note.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub replay_seed: Option<u64>,
    pub policy_eval_min_delta: f64,
    pub policy_sim_min_acceptance_ratio: f64,
    pub policy_review_p95_slo_hours: f64,
    pub security_audit_advisory: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let root = std::env::var("OPENCODE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_root());

        let replay_seed = std::env::var("OPENCODE_REPLAY_SEED")
            .ok()
            .and_then(|s| s.parse::<u64>().ok());

        let policy_eval_min_delta = parse_env_f64("OPENCODE_POLICY_EVAL_MIN_DELTA", 0.0);
        let policy_sim_min_acceptance_ratio =
            parse_env_f64("OPENCODE_POLICY_SIM_MIN_ACCEPTANCE_RATIO", 90.0);
        let policy_review_p95_slo_hours = parse_env_f64("OPENCODE_POLICY_REVIEW_P95_SLO_HOURS", 24.0);

        let security_audit_advisory = std::env::var("OPENCODE_SECURITY_AUDIT_MODE")
            .map(|v| v.eq_ignore_ascii_case("advisory"))
            .unwrap_or(false);

        Self {
            root,
            replay_seed,
            policy_eval_min_delta,
            policy_sim_min_acceptance_ratio,
            policy_review_p95_slo_hours,
            security_audit_advisory,
        }
    }

    pub fn skill_rl_path(&self) -> PathBuf {
        self.root.join("skill-rl.json")
    }

    pub fn plugin_runtime_state_path(&self) -> PathBuf {
        self.root.join("plugin-runtime-state.json")
    }

    pub fn model_router_state_path(&self) -> PathBuf {
        self.root.join("model-router-state.json")
    }

    pub fn policy_review_queue_path(&self) -> PathBuf {
        self.root.join("policy-review-queue.json")
    }

    pub fn rate_limits_path(&self) -> PathBuf {
        self.root.join("rate-limits.json")
    }

    pub fn strategy_health_path(&self) -> PathBuf {
        self.root.join("strategy-health.json")
    }

    pub fn workflow_db_path(&self) -> PathBuf {
        self.root.join("workflow.db")
    }
}

fn default_root() -> PathBuf {
    dirs_home().unwrap_or_else(|| PathBuf::from(".")).join(".opencode")
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<f64>().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "invalid numeric env var, falling back to default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_vars_fall_back_to_documented_defaults() {
        // Cleared explicitly rather than relying on ambient state, since
        // tests may run in any order within the same process.
        std::env::remove_var("OPENCODE_POLICY_EVAL_MIN_DELTA");
        std::env::remove_var("OPENCODE_POLICY_SIM_MIN_ACCEPTANCE_RATIO");
        std::env::remove_var("OPENCODE_POLICY_REVIEW_P95_SLO_HOURS");
        std::env::remove_var("OPENCODE_SECURITY_AUDIT_MODE");
        std::env::remove_var("OPENCODE_REPLAY_SEED");

        let config = Config::from_env();
        assert_eq!(config.policy_eval_min_delta, 0.0);
        assert_eq!(config.policy_sim_min_acceptance_ratio, 90.0);
        assert_eq!(config.policy_review_p95_slo_hours, 24.0);
        assert!(!config.security_audit_advisory);
        assert_eq!(config.replay_seed, None);
    }

    #[test]
    fn advisory_mode_is_case_insensitive() {
        std::env::set_var("OPENCODE_SECURITY_AUDIT_MODE", "Advisory");
        let config = Config::from_env();
        assert!(config.security_audit_advisory);
        std::env::remove_var("OPENCODE_SECURITY_AUDIT_MODE");
    }
}
