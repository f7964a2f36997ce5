//! Quota Manager data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotaType {
    Monthly,
    Daily,
    #[serde(rename = "request-based")]
    RequestBased,
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    Monthly,
    Daily,
    RequestBased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaStatus {
    /// Ranks below healthy so unlimited providers sort first.
    Unlimited,
    Healthy,
    Warning,
    Critical,
    Exhausted,
}

impl QuotaStatus {
    pub fn rank(self) -> i8 {
        match self {
            QuotaStatus::Unlimited => -1,
            QuotaStatus::Healthy => 0,
            QuotaStatus::Warning => 1,
            QuotaStatus::Critical => 2,
            QuotaStatus::Exhausted => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderQuota {
    pub provider_id: String,
    pub quota_type: QuotaType,
    /// Nullable positive integer; None means unlimited.
    pub quota_limit: Option<u64>,
    pub period: QuotaPeriod,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

impl ProviderQuota {
    /// Validates `warning <= critical <= 1`.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.warning_threshold) {
            return Err("warning_threshold out of [0,1]".into());
        }
        if !(0.0..=1.0).contains(&self.critical_threshold) {
            return Err("critical_threshold out of [0,1]".into());
        }
        if self.warning_threshold > self.critical_threshold {
            return Err("warning_threshold must be <= critical_threshold".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub provider_id: String,
    pub model_id: Option<String>,
    pub session_id: Option<String>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl UsageRecord {
    pub fn tokens_total(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub provider_id: String,
    pub tokens_used: u64,
    pub tokens_remaining: Option<u64>,
    pub percent_used: f64,
    pub status: QuotaStatus,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaFactor {
    pub provider: String,
    pub reason: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub task_id: Option<String>,
    pub requested_category: String,
    pub requested_skills: Vec<String>,
    pub original_selection: Option<String>,
    pub final_selection: Option<String>,
    pub quota_factors: Vec<QuotaFactor>,
    pub fallback_applied: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
