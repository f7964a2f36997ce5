//! The learning channel: `skill-rl.json`, fed by routing outcomes.
//!
//! Successful outcomes are not recorded here directly (they flow back
//! through the Quota Manager and Strategy Orchestrator's own health
//! tracking); this channel exists so that *failures* can influence
//! future strategy scores via a durable, append-only history, per the
//! Composition paragraph.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ocp_storage::atomic::{read_json_versioned, write_json_versioned};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillBank {
    pub general: Vec<String>,
    #[serde(rename = "taskSpecific")]
    pub task_specific: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub strategy: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionEngine {
    pub failure_count: u64,
    pub success_count: u64,
    pub failure_history: Vec<FailureEntry>,
    pub recent_adaptations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillRl {
    #[serde(rename = "skillBank")]
    pub skill_bank: SkillBank,
    #[serde(rename = "evolutionEngine")]
    pub evolution_engine: EvolutionEngine,
}

/// Bounds how much failure history accumulates before older entries are
/// dropped; unbounded growth here would turn every read into an
/// ever-slower full-file parse.
const MAX_FAILURE_HISTORY: usize = 200;

pub struct LearningChannel {
    path: PathBuf,
}

impl LearningChannel {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> std::io::Result<SkillRl> {
        Ok(read_json_versioned(&self.path)?.unwrap_or_default())
    }

    pub fn record_success(&self) -> std::io::Result<()> {
        let mut state = self.load()?;
        state.evolution_engine.success_count += 1;
        write_json_versioned(&self.path, &state)
    }

    pub fn record_failure(&self, strategy: &str, reason: &str) -> std::io::Result<()> {
        let mut state = self.load()?;
        state.evolution_engine.failure_count += 1;
        state.evolution_engine.failure_history.push(FailureEntry {
            strategy: strategy.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        let history = &mut state.evolution_engine.failure_history;
        if history.len() > MAX_FAILURE_HISTORY {
            let overflow = history.len() - MAX_FAILURE_HISTORY;
            history.drain(0..overflow);
        }
        write_json_versioned(&self.path, &state)
    }

    pub fn snapshot(&self) -> std::io::Result<SkillRl> {
        self.load()
    }
}

pub fn default_skill_rl_path(root: &Path) -> PathBuf {
    root.join("skill-rl.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_pre_migration_file_missing_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skill-rl.json");
        // A file written before schema_version existed: no envelope.
        std::fs::write(&path, r#"{"skillBank":{"general":["a"],"taskSpecific":[]},"evolutionEngine":{"failure_count":1,"success_count":0,"failure_history":[],"recent_adaptations":[]}}"#).unwrap();

        let channel = LearningChannel::new(path);
        let snapshot = channel.snapshot().unwrap();
        assert_eq!(snapshot.skill_bank.general, vec!["a".to_string()]);
    }

    #[test]
    fn record_failure_appends_and_bumps_count() {
        let dir = tempfile::tempdir().unwrap();
        let channel = LearningChannel::new(dir.path().join("skill-rl.json"));
        channel.record_failure("A", "boom").unwrap();
        channel.record_failure("B", "timeout").unwrap();

        let snapshot = channel.snapshot().unwrap();
        assert_eq!(snapshot.evolution_engine.failure_count, 2);
        assert_eq!(snapshot.evolution_engine.failure_history.len(), 2);
        assert_eq!(snapshot.evolution_engine.failure_history[1].strategy, "B");
    }

    #[test]
    fn record_success_is_independent_of_failure_count() {
        let dir = tempfile::tempdir().unwrap();
        let channel = LearningChannel::new(dir.path().join("skill-rl.json"));
        channel.record_success().unwrap();
        channel.record_success().unwrap();
        channel.record_failure("A", "boom").unwrap();

        let snapshot = channel.snapshot().unwrap();
        assert_eq!(snapshot.evolution_engine.success_count, 2);
        assert_eq!(snapshot.evolution_engine.failure_count, 1);
    }

    #[test]
    fn failure_history_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let channel = LearningChannel::new(dir.path().join("skill-rl.json"));
        for i in 0..(MAX_FAILURE_HISTORY + 10) {
            channel.record_failure("A", &format!("failure-{i}")).unwrap();
        }
        let snapshot = channel.snapshot().unwrap();
        assert_eq!(snapshot.evolution_engine.failure_history.len(), MAX_FAILURE_HISTORY);
        assert_eq!(snapshot.evolution_engine.failure_count, (MAX_FAILURE_HISTORY + 10) as u64);
    }
}
