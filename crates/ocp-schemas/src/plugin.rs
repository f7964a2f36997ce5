//! Plugin Lifecycle Supervisor data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    Healthy,
    Degraded,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginReasonCode {
    Ok,
    MissingHeartbeat,
    MissingDependency,
    CrashLoop,
    PolicyViolation,
    NotDiscovered,
    NotConfigured,
}

/// One periodic observation of a plugin's liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSample {
    pub name: String,
    pub configured: bool,
    pub discovered: bool,
    pub heartbeat_ok: bool,
    pub dependency_ok: bool,
    #[serde(default)]
    pub policy_violation: bool,
    #[serde(default)]
    pub crash_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRecord {
    pub name: String,
    pub status: PluginStatus,
    pub quarantine: bool,
    pub reason_code: PluginReasonCode,
    pub transition_reason: String,
    pub crash_count: u32,
    pub last_seen: DateTime<Utc>,
}
