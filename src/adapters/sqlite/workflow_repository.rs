//! SQLite implementation of the WorkflowRepository.
//!
//! Every write runs in a single transaction that updates `workflow_state`
//! with a version guard and appends to `stage_history`.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_enum, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ArtifactKind, HistoryEvent, StageFlag, StageTransitionRecord, WorkflowState};
use crate::domain::ports::WorkflowRepository;

#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: SqlitePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn insert_record(
    conn: &mut sqlx::SqliteConnection,
    record: &StageTransitionRecord,
    sequence: u64,
) -> DomainResult<()> {
    sqlx::query(
        "INSERT INTO stage_history (artifact_id, sequence, from_stage, to_stage, actor, event, comment, timestamp)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.artifact_id.to_string())
    .bind(sequence as i64)
    .bind(&record.from_stage)
    .bind(&record.to_stage)
    .bind(&record.actor)
    .bind(record.event.as_str())
    .bind(&record.comment)
    .bind(record.timestamp.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl WorkflowRepository for SqliteWorkflowRepository {
    async fn get_state(&self, artifact_id: Uuid) -> DomainResult<Option<WorkflowState>> {
        let row: Option<WorkflowStateRow> = sqlx::query_as(
            "SELECT artifact_id, kind, current_stage, version, stage_status, entered_at, updated_at
             FROM workflow_state WHERE artifact_id = ?",
        )
        .bind(artifact_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(WorkflowStateRow::try_into_state).transpose()
    }

    async fn initialize(&self, state: &WorkflowState, record: &StageTransitionRecord) -> DomainResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO workflow_state
             (artifact_id, kind, current_stage, version, stage_status, entered_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(state.artifact_id.to_string())
        .bind(state.kind.as_str())
        .bind(&state.current_stage)
        .bind(state.flag.as_str())
        .bind(state.entered_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_record(&mut *tx, record, 1).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn commit(
        &self,
        expected_version: u64,
        state: &WorkflowState,
        record: &StageTransitionRecord,
    ) -> DomainResult<WorkflowState> {
        let next_version = expected_version + 1;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE workflow_state
             SET current_stage = ?, version = ?, stage_status = ?, entered_at = ?, updated_at = ?
             WHERE artifact_id = ? AND version = ?",
        )
        .bind(&state.current_stage)
        .bind(next_version as i64)
        .bind(state.flag.as_str())
        .bind(state.entered_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .bind(state.artifact_id.to_string())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DomainError::ConcurrencyConflict {
                artifact_id: state.artifact_id,
                expected_version,
            });
        }

        insert_record(&mut *tx, record, next_version).await?;
        tx.commit().await?;

        Ok(WorkflowState {
            version: next_version,
            ..state.clone()
        })
    }

    async fn history(&self, artifact_id: Uuid) -> DomainResult<Vec<StageTransitionRecord>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT artifact_id, sequence, from_stage, to_stage, actor, event, comment, timestamp
             FROM stage_history WHERE artifact_id = ? ORDER BY sequence ASC",
        )
        .bind(artifact_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryRow::try_into_record).collect()
    }

    async fn list_states(&self) -> DomainResult<Vec<WorkflowState>> {
        let rows: Vec<WorkflowStateRow> = sqlx::query_as(
            "SELECT artifact_id, kind, current_stage, version, stage_status, entered_at, updated_at
             FROM workflow_state ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkflowStateRow::try_into_state).collect()
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowStateRow {
    artifact_id: String,
    kind: String,
    current_stage: String,
    version: i64,
    stage_status: String,
    entered_at: String,
    updated_at: String,
}

impl WorkflowStateRow {
    fn try_into_state(self) -> DomainResult<WorkflowState> {
        Ok(WorkflowState {
            artifact_id: parse_uuid(&self.artifact_id)?,
            kind: parse_enum(&self.kind, "artifact kind", ArtifactKind::from_str)?,
            current_stage: self.current_stage,
            version: self.version as u64,
            flag: parse_enum(&self.stage_status, "stage status", StageFlag::from_str)?,
            entered_at: parse_datetime(&self.entered_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    artifact_id: String,
    sequence: i64,
    from_stage: Option<String>,
    to_stage: String,
    actor: String,
    event: String,
    comment: Option<String>,
    timestamp: String,
}

impl HistoryRow {
    fn try_into_record(self) -> DomainResult<StageTransitionRecord> {
        Ok(StageTransitionRecord {
            artifact_id: parse_uuid(&self.artifact_id)?,
            sequence: self.sequence as u64,
            from_stage: self.from_stage,
            to_stage: self.to_stage,
            actor: self.actor,
            timestamp: parse_datetime(&self.timestamp)?,
            comment: self.comment,
            event: parse_enum(&self.event, "history event", HistoryEvent::from_str)?,
        })
    }
}
