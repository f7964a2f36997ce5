//! Per-provider API key rotation, persisted as `model-router-state.json`.
//!
//! A dead key is never selected. A cooldown key is skipped until its
//! deadline passes, at which point it is eligible for one probing
//! selection: a success on that probe returns it to `healthy`, a
//! failure marks it `dead`.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{Duration as ChronoDuration, Utc};
use ocp_schemas::{KeyRotatorState, KeyStatus};
use ocp_storage::atomic::{read_json_versioned, write_json_versioned};
use parking_lot::RwLock;

#[derive(Debug, Clone)]
pub struct KeyRotatorConfig {
    pub cooldown: ChronoDuration,
}

impl Default for KeyRotatorConfig {
    fn default() -> Self {
        Self {
            cooldown: ChronoDuration::seconds(60),
        }
    }
}

pub struct KeyRotator {
    states: RwLock<HashMap<String, KeyRotatorState>>,
    path: Option<PathBuf>,
    config: KeyRotatorConfig,
}

impl Default for KeyRotator {
    fn default() -> Self {
        Self::new(KeyRotatorConfig::default())
    }
}

impl KeyRotator {
    pub fn new(config: KeyRotatorConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            path: None,
            config,
        }
    }

    /// Loads any prior rotator state from `path` and persists every
    /// subsequent mutation back to it.
    pub fn with_store(path: PathBuf, config: KeyRotatorConfig) -> Self {
        let states = read_json_versioned(&path).ok().flatten().unwrap_or_default();
        Self {
            states: RwLock::new(states),
            path: Some(path),
            config,
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else { return };
        let states = self.states.read();
        if let Err(e) = write_json_versioned(path, &*states) {
            tracing::warn!(error = %e, "failed to persist key rotator state");
        }
    }

    /// No-op if `provider_id` is already registered (the existing key
    /// list and its accumulated health are left untouched).
    pub fn register_provider(&self, provider_id: &str, key_ids: impl IntoIterator<Item = String>) {
        let mut states = self.states.write();
        states
            .entry(provider_id.to_string())
            .or_insert_with(|| KeyRotatorState::new(provider_id, key_ids));
        drop(states);
        self.persist();
    }

    /// Selects the least-recently-used eligible key for `provider_id`
    /// and bumps its rotating counter. Returns `None` if the provider is
    /// unregistered or every key is dead or still in cooldown.
    pub fn select_key(&self, provider_id: &str) -> Option<String> {
        let now = Utc::now();
        let mut states = self.states.write();
        let state = states.get_mut(provider_id)?;

        let eligible_idx = state
            .keys
            .iter()
            .enumerate()
            .filter(|(_, key)| key.is_eligible(now))
            .min_by_key(|(_, key)| key.rotating_counter)
            .map(|(i, _)| i)?;

        let key = &mut state.keys[eligible_idx];
        key.rotating_counter += 1;
        let key_id = key.key_id.clone();
        drop(states);
        self.persist();
        Some(key_id)
    }

    /// A successful call against `key_id` clears any cooldown/dead
    /// marking -- this is how a half-open probe's success is reported.
    pub fn record_success(&self, provider_id: &str, key_id: &str) {
        let mut states = self.states.write();
        if let Some(key) = find_key_mut(&mut states, provider_id, key_id) {
            key.status = KeyStatus::Healthy;
            key.cooldown_until = None;
            key.last_failure_reason = None;
        }
        drop(states);
        self.persist();
    }

    /// A failure on a `healthy` key starts a cooldown; a failure on a
    /// key that was already in cooldown (i.e. its probe failed) marks
    /// it `dead`.
    pub fn record_failure(&self, provider_id: &str, key_id: &str, reason: impl Into<String>) {
        let now = Utc::now();
        let reason = reason.into();
        let cooldown = self.config.cooldown;
        let mut states = self.states.write();
        if let Some(key) = find_key_mut(&mut states, provider_id, key_id) {
            key.last_failure_reason = Some(reason);
            key.status = match key.status {
                KeyStatus::Cooldown => KeyStatus::Dead,
                KeyStatus::Dead => KeyStatus::Dead,
                KeyStatus::Healthy => {
                    key.cooldown_until = Some(now + cooldown);
                    KeyStatus::Cooldown
                }
            };
        }
        drop(states);
        self.persist();
    }

    pub fn mark_dead(&self, provider_id: &str, key_id: &str, reason: impl Into<String>) {
        let mut states = self.states.write();
        if let Some(key) = find_key_mut(&mut states, provider_id, key_id) {
            key.status = KeyStatus::Dead;
            key.last_failure_reason = Some(reason.into());
        }
        drop(states);
        self.persist();
    }

    pub fn key_statuses(&self, provider_id: &str) -> Vec<KeyStatus> {
        self.states
            .read()
            .get(provider_id)
            .map(|state| state.keys.iter().map(|k| k.status).collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HashMap<String, KeyRotatorState> {
        self.states.read().clone()
    }
}

fn find_key_mut<'a>(
    states: &'a mut HashMap<String, KeyRotatorState>,
    provider_id: &str,
    key_id: &str,
) -> Option<&'a mut ocp_schemas::KeyRecord> {
    states
        .get_mut(provider_id)?
        .keys
        .iter_mut()
        .find(|k| k.key_id == key_id)
}
