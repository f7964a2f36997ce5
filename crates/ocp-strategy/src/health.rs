//! Atomic persistence for strategy health, keyed by strategy name.

use std::collections::HashMap;
use std::path::PathBuf;

use ocp_schemas::StrategyHealth;
use ocp_storage::atomic::{read_json_versioned, write_json_versioned};

pub struct HealthStore {
    path: PathBuf,
}

impl HealthStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> HashMap<String, StrategyHealth> {
        read_json_versioned(&self.path).ok().flatten().unwrap_or_default()
    }

    pub fn save(&self, health: &HashMap<String, StrategyHealth>) -> std::io::Result<()> {
        write_json_versioned(&self.path, health)
    }
}
