//! Key rotator data model.
//!
//! A provider may front several API keys; the rotator tracks each
//! key's health independently of the provider-level quota.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Healthy,
    Cooldown,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: String,
    pub status: KeyStatus,
    pub last_failure_reason: Option<String>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub rotating_counter: u64,
}

impl KeyRecord {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            status: KeyStatus::Healthy,
            last_failure_reason: None,
            cooldown_until: None,
            rotating_counter: 0,
        }
    }

    /// A `dead` key is never selected. A `cooldown` key is skipped
    /// until `now >= cooldown_until`, at which point it becomes
    /// eligible again for a single probing selection.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            KeyStatus::Dead => false,
            KeyStatus::Healthy => true,
            KeyStatus::Cooldown => self.cooldown_until.is_none_or(|until| now >= until),
        }
    }
}

/// Per-provider ordered key list. Persisted as `model-router-state.json`,
/// keyed by `provider_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRotatorState {
    pub provider_id: String,
    pub keys: Vec<KeyRecord>,
}

impl KeyRotatorState {
    pub fn new(provider_id: impl Into<String>, key_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            keys: key_ids.into_iter().map(KeyRecord::new).collect(),
        }
    }
}
