//! Strategy Orchestrator persisted health record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyHealth {
    pub strategy_name: String,
    pub total_invocations: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    pub bypass_until: Option<DateTime<Utc>>,
    pub bypass_count: u64,
}

impl StrategyHealth {
    pub fn new(strategy_name: impl Into<String>) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            total_invocations: 0,
            total_failures: 0,
            consecutive_failures: 0,
            bypass_until: None,
            bypass_count: 0,
        }
    }

    pub fn is_bypassed(&self, now: DateTime<Utc>) -> bool {
        self.bypass_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_health_is_not_bypassed() {
        let h = StrategyHealth::new("a");
        assert!(!h.is_bypassed(Utc::now()));
    }
}
