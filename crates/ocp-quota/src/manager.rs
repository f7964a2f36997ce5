//! Quota Manager: accepts usage reports, maintains per-provider
//! aggregates, classifies headroom, and advises routing fallback.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Duration, Utc};
use ocp_schemas::{
    KeyStatus, ProviderQuota, QuotaPeriod, QuotaSnapshot, QuotaStatus, QuotaType, RoutingDecision,
    UsageRecord,
};
use ocp_storage::atomic::{read_json_versioned, write_json_versioned};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rotator::compose_risk;

/// On-disk shape of `rate-limits.json`. `models` is reserved for
/// per-model accounting and currently always empty; only provider-level
/// usage is tracked today.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RateLimitsFile {
    #[serde(default)]
    providers: HashMap<String, PersistedUsage>,
    #[serde(default)]
    models: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedUsage {
    requests: u64,
    #[serde(rename = "tokensUsed")]
    tokens_used: u64,
    #[serde(rename = "lastReset")]
    last_reset: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("invalid provider config: {0}")]
    InvalidConfig(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

#[derive(Debug, Clone)]
pub struct UsageInput {
    pub provider_id: String,
    pub model_id: Option<String>,
    pub session_id: Option<String>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: Option<f64>,
}

struct ProviderAccount {
    config: ProviderQuota,
    period_start: DateTime<Utc>,
    tokens_used: u64,
    requests_used: u64,
}

impl ProviderAccount {
    fn new(config: ProviderQuota) -> Self {
        Self {
            period_start: period_start_for(config.period, Utc::now()),
            config,
            tokens_used: 0,
            requests_used: 0,
        }
    }

    fn maybe_roll_over(&mut self, now: DateTime<Utc>) {
        let current_start = period_start_for(self.config.period, now);
        if current_start > self.period_start {
            self.period_start = current_start;
            self.tokens_used = 0;
            self.requests_used = 0;
        }
    }

    fn used(&self) -> u64 {
        match self.config.quota_type {
            QuotaType::RequestBased => self.requests_used,
            _ => self.tokens_used,
        }
    }

    fn percent_used(&self) -> f64 {
        match self.config.quota_limit {
            None => 0.0,
            Some(limit) if limit == 0 => 1.0,
            Some(limit) => self.used() as f64 / limit as f64,
        }
    }

    fn classify(&self) -> QuotaStatus {
        if self.config.quota_limit.is_none() {
            return QuotaStatus::Unlimited;
        }
        let p = self.percent_used();
        if p >= 1.0 {
            QuotaStatus::Exhausted
        } else if p >= self.config.critical_threshold {
            QuotaStatus::Critical
        } else if p >= self.config.warning_threshold {
            QuotaStatus::Warning
        } else {
            QuotaStatus::Healthy
        }
    }
}

/// `monthly` resets at UTC month start; `daily` at UTC midnight;
/// `request-based` never resets here (pruning is an external tool).
fn period_start_for(period: QuotaPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    match period {
        QuotaPeriod::Daily => now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
        QuotaPeriod::Monthly => now
            .date_naive()
            .with_day(1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc(),
        QuotaPeriod::RequestBased => DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
    }
}

pub struct QuotaManager {
    accounts: RwLock<HashMap<String, ProviderAccount>>,
    decisions: RwLock<Vec<RoutingDecision>>,
    path: Option<PathBuf>,
}

impl Default for QuotaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaManager {
    /// In-memory only; usage accounting does not survive a restart.
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            decisions: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Persists usage accounting to `rate-limits.json` at `path`,
    /// loading any prior state immediately so a restarted process does
    /// not reset counters a caller already paid quota against.
    pub fn with_persistence(path: PathBuf) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            decisions: RwLock::new(Vec::new()),
            path: Some(path),
        }
    }

    fn persisted_usage(&self, provider_id: &str) -> Option<PersistedUsage> {
        let path = self.path.as_ref()?;
        let file: RateLimitsFile = read_json_versioned(path).ok().flatten()?;
        file.providers.get(provider_id).cloned()
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        let accounts = self.accounts.read();
        let providers = accounts
            .iter()
            .map(|(id, account)| {
                (
                    id.clone(),
                    PersistedUsage {
                        requests: account.requests_used,
                        tokens_used: account.tokens_used,
                        last_reset: account.period_start,
                    },
                )
            })
            .collect();
        drop(accounts);

        let file = RateLimitsFile { providers, models: HashMap::new() };
        if let Err(e) = write_json_versioned(path, &file) {
            tracing::warn!(error = %e, path = %path.display(), "failed to persist quota manager state");
        }
    }

    /// Idempotent on identical input; overwrites the existing account's
    /// configuration (but not its accumulated usage) on change. When
    /// persistence is enabled and this provider has prior usage on
    /// disk, the new account seeds from it instead of starting at zero.
    pub fn setup_provider(&self, config: ProviderQuota) -> Result<(), QuotaError> {
        config
            .validate()
            .map_err(QuotaError::InvalidConfig)?;

        let provider_id = config.provider_id.clone();
        let persisted = self.persisted_usage(&provider_id);

        let mut accounts = self.accounts.write();
        match accounts.get_mut(&provider_id) {
            Some(existing) => existing.config = config,
            None => {
                let mut account = ProviderAccount::new(config);
                if let Some(usage) = persisted {
                    account.period_start = usage.last_reset;
                    account.tokens_used = usage.tokens_used;
                    account.requests_used = usage.requests;
                }
                accounts.insert(provider_id, account);
            }
        }
        drop(accounts);
        self.persist();
        Ok(())
    }

    pub fn record_usage(&self, usage: UsageInput) -> Result<UsageRecord, QuotaError> {
        let now = Utc::now();
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&usage.provider_id)
            .ok_or_else(|| QuotaError::UnknownProvider(usage.provider_id.clone()))?;

        account.maybe_roll_over(now);
        account.tokens_used += usage.tokens_in + usage.tokens_out;
        account.requests_used += 1;
        drop(accounts);
        self.persist();

        Ok(UsageRecord {
            id: Uuid::now_v7(),
            provider_id: usage.provider_id,
            model_id: usage.model_id,
            session_id: usage.session_id,
            tokens_in: usage.tokens_in,
            tokens_out: usage.tokens_out,
            cost: usage.cost,
            timestamp: now,
        })
    }

    /// Returns `None` for unknown providers, `Some(status=unlimited)`
    /// for providers configured with no limit.
    pub fn get_quota_status(&self, provider_id: &str) -> Option<QuotaSnapshot> {
        let mut accounts = self.accounts.write();
        let account = accounts.get_mut(provider_id)?;
        account.maybe_roll_over(Utc::now());

        let status = account.classify();
        let used = account.used();
        let tokens_remaining = account.config.quota_limit.map(|limit| limit.saturating_sub(used));

        Some(QuotaSnapshot {
            provider_id: provider_id.to_string(),
            tokens_used: used,
            tokens_remaining,
            percent_used: if matches!(status, QuotaStatus::Unlimited) {
                0.0
            } else {
                account.percent_used()
            },
            status,
            computed_at: Utc::now(),
        })
    }

    /// Composes provider percent-used with rotator risk when key-rotator
    /// state is supplied by the caller (the Quota Manager has no
    /// knowledge of key rotation itself).
    pub fn get_quota_status_with_rotator(
        &self,
        provider_id: &str,
        key_statuses: &[KeyStatus],
    ) -> Option<QuotaSnapshot> {
        let mut snapshot = self.get_quota_status(provider_id)?;
        if !matches!(snapshot.status, QuotaStatus::Unlimited) {
            snapshot.percent_used = compose_risk(snapshot.percent_used, key_statuses);
        }
        Some(snapshot)
    }

    pub fn get_healthy_providers(&self) -> Vec<(String, f64, QuotaStatus)> {
        let mut accounts = self.accounts.write();
        let now = Utc::now();
        let mut result: Vec<(String, f64, QuotaStatus)> = accounts
            .iter_mut()
            .filter_map(|(id, account)| {
                account.maybe_roll_over(now);
                let status = account.classify();
                if status == QuotaStatus::Exhausted {
                    None
                } else {
                    Some((id.clone(), account.percent_used(), status))
                }
            })
            .collect();
        result.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        result
    }

    pub fn suggest_fallback(&self, exclude_providers: &[String]) -> Vec<(String, f64, QuotaStatus)> {
        self.get_healthy_providers()
            .into_iter()
            .filter(|(id, _, _)| !exclude_providers.contains(id))
            .collect()
    }

    pub fn log_routing_decision(&self, decision: RoutingDecision) {
        self.decisions.write().push(decision);
        self.persist();
    }

    pub fn routing_decisions(&self) -> Vec<RoutingDecision> {
        self.decisions.read().clone()
    }
}
