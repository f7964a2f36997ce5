//! Wraps [`evaluate`] with in-memory state tracking and atomic
//! persistence of the full plugin map after every cycle.

use std::collections::HashMap;
use std::path::PathBuf;

use ocp_schemas::{PluginRecord, PluginSample};
use ocp_storage::atomic::{read_json_versioned, write_json_versioned};
use parking_lot::RwLock;

use crate::evaluate::{evaluate, DEFAULT_QUARANTINE_THRESHOLD};

pub struct PluginSupervisor {
    path: PathBuf,
    quarantine_threshold: u32,
    records: RwLock<HashMap<String, PluginRecord>>,
}

impl PluginSupervisor {
    pub fn new(path: PathBuf) -> Self {
        let records = read_json_versioned(&path).ok().flatten().unwrap_or_default();
        Self {
            path,
            quarantine_threshold: DEFAULT_QUARANTINE_THRESHOLD,
            records: RwLock::new(records),
        }
    }

    pub fn with_quarantine_threshold(mut self, threshold: u32) -> Self {
        self.quarantine_threshold = threshold;
        self
    }

    /// Evaluates one sample, upserts the resulting record, and
    /// persists the full map atomically. Readers (dashboards, external
    /// tools) may read the file at any time and must tolerate a stale
    /// snapshot mid-cycle.
    pub fn evaluate_sample(&self, sample: &PluginSample) -> PluginRecord {
        let mut records = self.records.write();
        let previous = records.get(&sample.name).cloned();
        let record = evaluate(sample, previous.as_ref(), self.quarantine_threshold);
        records.insert(sample.name.clone(), record.clone());

        if let Err(e) = write_json_versioned(&self.path, &*records) {
            tracing::warn!(error = %e, plugin = %sample.name, "failed to persist plugin lifecycle state");
        }

        record
    }

    pub fn get(&self, name: &str) -> Option<PluginRecord> {
        self.records.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, PluginRecord> {
        self.records.read().clone()
    }
}
