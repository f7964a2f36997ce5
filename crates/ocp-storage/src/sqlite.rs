//! SQLite-backed workflow store.
//!
//! Opens in WAL mode with `synchronous=NORMAL` per the durability
//! requirement: crash-consistency without the latency of `FULL` fsync
//! on every write. Single-process authority; readers outside the
//! owning process may open the same file read-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocp_schemas::{AuditEvent, WorkflowRun, WorkflowRunStatus, WorkflowStep, WorkflowStepStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::store::{StoreError, WorkflowStore};

pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_runs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                input TEXT NOT NULL,
                context TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_steps (
                run_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                step_type TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                retries INTEGER NOT NULL,
                backoff_ms INTEGER NOT NULL,
                result TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (run_id, step_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

fn step_status_str(status: &WorkflowStepStatus) -> &'static str {
    match status {
        WorkflowStepStatus::Pending => "pending",
        WorkflowStepStatus::Running => "running",
        WorkflowStepStatus::Completed => "completed",
        WorkflowStepStatus::Failed => "failed",
    }
}

fn parse_step_status(s: &str) -> WorkflowStepStatus {
    match s {
        "running" => WorkflowStepStatus::Running,
        "completed" => WorkflowStepStatus::Completed,
        "failed" => WorkflowStepStatus::Failed,
        _ => WorkflowStepStatus::Pending,
    }
}

fn run_status_str(status: &WorkflowRunStatus) -> &'static str {
    match status {
        WorkflowRunStatus::Running => "running",
        WorkflowRunStatus::Completed => "completed",
        WorkflowRunStatus::Failed => "failed",
    }
}

fn parse_run_status(s: &str) -> WorkflowRunStatus {
    match s {
        "completed" => WorkflowRunStatus::Completed,
        "failed" => WorkflowRunStatus::Failed,
        _ => WorkflowRunStatus::Running,
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn create_run(&self, run: WorkflowRun) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO workflow_runs (id, name, status, input, context, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(&run.name)
        .bind(run_status_str(&run.status))
        .bind(run.input.to_string())
        .bind(run.context.to_string())
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, StoreError> {
        let row = sqlx::query("SELECT * FROM workflow_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let Some(row) = row else { return Ok(None) };

        let input: String = row.try_get("input").map_err(|e| StoreError::Database(e.to_string()))?;
        let context: String = row.try_get("context").map_err(|e| StoreError::Database(e.to_string()))?;
        let status: String = row.try_get("status").map_err(|e| StoreError::Database(e.to_string()))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Some(WorkflowRun {
            id: run_id,
            name: row.try_get("name").map_err(|e| StoreError::Database(e.to_string()))?,
            status: parse_run_status(&status),
            input: serde_json::from_str(&input).map_err(|e| StoreError::SchemaMismatch(e.to_string()))?,
            context: serde_json::from_str(&context).map_err(|e| StoreError::SchemaMismatch(e.to_string()))?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    async fn update_run_status(
        &self,
        run_id: Uuid,
        status: WorkflowRunStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE workflow_runs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(run_status_str(&status))
            .bind(Utc::now().to_rfc3339())
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }
        Ok(())
    }

    async fn update_run_context(&self, run_id: Uuid, context: serde_json::Value) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE workflow_runs SET context = ?, updated_at = ? WHERE id = ?")
            .bind(context.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }
        Ok(())
    }

    async fn upsert_step(&self, step: WorkflowStep) -> Result<(), StoreError> {
        let result_json = step
            .result
            .as_ref()
            .map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO workflow_steps
                (run_id, step_id, step_type, status, attempts, retries, backoff_ms, result, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id, step_id) DO UPDATE SET
                step_type = excluded.step_type,
                status = excluded.status,
                attempts = excluded.attempts,
                retries = excluded.retries,
                backoff_ms = excluded.backoff_ms,
                result = excluded.result,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(step.run_id.to_string())
        .bind(&step.step_id)
        .bind(&step.step_type)
        .bind(step_status_str(&step.status))
        .bind(step.attempts as i64)
        .bind(step.retries as i64)
        .bind(step.backoff_ms as i64)
        .bind(result_json)
        .bind(step.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_step(&self, run_id: Uuid, step_id: &str) -> Result<Option<WorkflowStep>, StoreError> {
        let row = sqlx::query("SELECT * FROM workflow_steps WHERE run_id = ? AND step_id = ?")
            .bind(run_id.to_string())
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.map(|r| row_to_step(run_id, &r)).transpose()
    }

    async fn get_steps(&self, run_id: Uuid) -> Result<Vec<WorkflowStep>, StoreError> {
        let rows = sqlx::query("SELECT * FROM workflow_steps WHERE run_id = ? ORDER BY rowid")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter().map(|r| row_to_step(run_id, r)).collect()
    }

    async fn append_event(&self, event: AuditEvent) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO audit_events (run_id, event_type, payload, timestamp) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(event.run_id.to_string())
        .bind(&event.event_type)
        .bind(event.payload.to_string())
        .bind(event.timestamp.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.try_get::<i64, _>("id").map_err(|e| StoreError::Database(e.to_string()))
    }

    async fn get_events(&self, run_id: Uuid) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = sqlx::query("SELECT * FROM audit_events WHERE run_id = ? ORDER BY id")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.iter()
            .map(|r| {
                let payload: String = r.try_get("payload").map_err(|e| StoreError::Database(e.to_string()))?;
                let timestamp: String = r.try_get("timestamp").map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(AuditEvent {
                    id: r.try_get("id").map_err(|e| StoreError::Database(e.to_string()))?,
                    run_id,
                    event_type: r.try_get("event_type").map_err(|e| StoreError::Database(e.to_string()))?,
                    payload: serde_json::from_str(&payload)
                        .map_err(|e| StoreError::SchemaMismatch(e.to_string()))?,
                    timestamp: parse_timestamp(&timestamp)?,
                })
            })
            .collect()
    }

    async fn commit_step_transition(
        &self,
        step: WorkflowStep,
        context: Option<serde_json::Value>,
        run_status: Option<WorkflowRunStatus>,
        event: AuditEvent,
    ) -> Result<i64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let result_json = step.result.as_ref().map(|v| v.to_string());
        sqlx::query(
            r#"
            INSERT INTO workflow_steps
                (run_id, step_id, step_type, status, attempts, retries, backoff_ms, result, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id, step_id) DO UPDATE SET
                step_type = excluded.step_type,
                status = excluded.status,
                attempts = excluded.attempts,
                retries = excluded.retries,
                backoff_ms = excluded.backoff_ms,
                result = excluded.result,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(step.run_id.to_string())
        .bind(&step.step_id)
        .bind(&step.step_type)
        .bind(step_status_str(&step.status))
        .bind(step.attempts as i64)
        .bind(step.retries as i64)
        .bind(step.backoff_ms as i64)
        .bind(result_json)
        .bind(step.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        if context.is_some() || run_status.is_some() {
            let now = Utc::now().to_rfc3339();
            let result = match (context, run_status) {
                (Some(context), Some(status)) => {
                    sqlx::query(
                        "UPDATE workflow_runs SET context = ?, status = ?, updated_at = ? WHERE id = ?",
                    )
                    .bind(context.to_string())
                    .bind(run_status_str(&status))
                    .bind(&now)
                    .bind(step.run_id.to_string())
                    .execute(&mut *tx)
                    .await
                }
                (Some(context), None) => {
                    sqlx::query("UPDATE workflow_runs SET context = ?, updated_at = ? WHERE id = ?")
                        .bind(context.to_string())
                        .bind(&now)
                        .bind(step.run_id.to_string())
                        .execute(&mut *tx)
                        .await
                }
                (None, Some(status)) => {
                    sqlx::query("UPDATE workflow_runs SET status = ?, updated_at = ? WHERE id = ?")
                        .bind(run_status_str(&status))
                        .bind(&now)
                        .bind(step.run_id.to_string())
                        .execute(&mut *tx)
                        .await
                }
                (None, None) => unreachable!("guarded by outer is_some check"),
            }
            .map_err(|e| StoreError::Database(e.to_string()))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::RunNotFound(step.run_id));
            }
        }

        let row = sqlx::query(
            "INSERT INTO audit_events (run_id, event_type, payload, timestamp) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(event.run_id.to_string())
        .bind(&event.event_type)
        .bind(event.payload.to_string())
        .bind(event.timestamp.to_rfc3339())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let event_id = row.try_get::<i64, _>("id").map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit().await.map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(event_id)
    }
}

fn row_to_step(run_id: Uuid, row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowStep, StoreError> {
    let status: String = row.try_get("status").map_err(|e| StoreError::Database(e.to_string()))?;
    let result: Option<String> = row.try_get("result").map_err(|e| StoreError::Database(e.to_string()))?;
    let updated_at: String = row.try_get("updated_at").map_err(|e| StoreError::Database(e.to_string()))?;

    Ok(WorkflowStep {
        run_id,
        step_id: row.try_get("step_id").map_err(|e| StoreError::Database(e.to_string()))?,
        step_type: row.try_get("step_type").map_err(|e| StoreError::Database(e.to_string()))?,
        status: parse_step_status(&status),
        attempts: row.try_get::<i64, _>("attempts").map_err(|e| StoreError::Database(e.to_string()))? as u32,
        retries: row.try_get::<i64, _>("retries").map_err(|e| StoreError::Database(e.to_string()))? as u32,
        backoff_ms: row.try_get::<i64, _>("backoff_ms").map_err(|e| StoreError::Database(e.to_string()))? as u64,
        result: result
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| StoreError::SchemaMismatch(e.to_string()))?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::SchemaMismatch(e.to_string()))
}
