//! Evidence artifacts: structured records written for high-impact
//! tasks and consumed only by external collaborators (the dashboard,
//! review tooling). This layer only produces the file; readers are
//! out of scope.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ocp_storage::atomic::write_json_versioned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub task_id: Option<String>,
    pub summary: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Evidence {
    pub fn new(task_id: Option<String>, summary: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            task_id,
            summary: summary.into(),
            details,
            created_at: Utc::now(),
        }
    }
}

pub struct EvidenceWriter {
    dir: PathBuf,
}

impl EvidenceWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, evidence: &Evidence) -> std::io::Result<PathBuf> {
        let path = self.path_for(evidence.id);
        write_json_versioned(&path, evidence)?;
        Ok(path)
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("evidence-{id}.json"))
    }
}

pub fn default_evidence_dir(root: &Path) -> PathBuf {
    root.join("evidence")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_persists_readable_json() {
        let dir = tempfile::tempdir().unwrap();
        let writer = EvidenceWriter::new(dir.path().to_path_buf());
        let evidence = Evidence::new(Some("task-1".into()), "high impact task", serde_json::json!({}));
        let path = writer.write(&evidence).unwrap();
        assert!(path.exists());
    }
}
