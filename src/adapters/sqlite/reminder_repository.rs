//! SQLite implementation of the ReminderRepository.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_enum, parse_optional_datetime, parse_uuid};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Priority, ReminderKind, ReminderState, ScheduledReminder};
use crate::domain::ports::ReminderRepository;

/// Fixed-width timestamps so `fire_at` compares correctly as text.
fn sortable(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone)]
pub struct SqliteReminderRepository {
    pool: SqlitePool,
}

impl SqliteReminderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderRepository for SqliteReminderRepository {
    async fn insert_many(&self, reminders: &[ScheduledReminder]) -> DomainResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for r in reminders {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO reminders
                 (id, artifact_id, stage, due_at, fire_at, kind, sequence, total_expected, days_offset,
                  priority, template_id, state, delivered_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(r.id.to_string())
            .bind(r.artifact_id.to_string())
            .bind(&r.stage)
            .bind(sortable(r.due_at))
            .bind(sortable(r.fire_at))
            .bind(r.kind.as_str())
            .bind(i64::from(r.sequence))
            .bind(i64::from(r.total_expected))
            .bind(r.days_offset)
            .bind(r.priority.as_str())
            .bind(&r.template_id)
            .bind(r.state.as_str())
            .bind(r.delivered_at.map(sortable))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<ScheduledReminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT id, artifact_id, stage, due_at, fire_at, kind, sequence, total_expected, days_offset,
                    priority, template_id, state, delivered_at
             FROM reminders WHERE state = 'pending' AND fire_at <= ?
             ORDER BY fire_at ASC LIMIT ?",
        )
        .bind(sortable(now))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReminderRow::try_into_reminder).collect()
    }

    async fn claim(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE reminders SET state = 'sending' WHERE id = ? AND state = 'pending'")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        sqlx::query("UPDATE reminders SET state = 'delivered', delivered_at = ? WHERE id = ?")
            .bind(sortable(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_pending(&self, artifact_id: Uuid) -> DomainResult<usize> {
        let result = sqlx::query("DELETE FROM reminders WHERE artifact_id = ? AND state = 'pending'")
            .bind(artifact_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn list_for_artifact(&self, artifact_id: Uuid) -> DomainResult<Vec<ScheduledReminder>> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT id, artifact_id, stage, due_at, fire_at, kind, sequence, total_expected, days_offset,
                    priority, template_id, state, delivered_at
             FROM reminders WHERE artifact_id = ? ORDER BY fire_at ASC",
        )
        .bind(artifact_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReminderRow::try_into_reminder).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: String,
    artifact_id: String,
    stage: String,
    due_at: String,
    fire_at: String,
    kind: String,
    sequence: i64,
    total_expected: i64,
    days_offset: i64,
    priority: String,
    template_id: String,
    state: String,
    delivered_at: Option<String>,
}

impl ReminderRow {
    fn try_into_reminder(self) -> DomainResult<ScheduledReminder> {
        Ok(ScheduledReminder {
            id: parse_uuid(&self.id)?,
            artifact_id: parse_uuid(&self.artifact_id)?,
            stage: self.stage,
            due_at: parse_datetime(&self.due_at)?,
            fire_at: parse_datetime(&self.fire_at)?,
            kind: parse_enum(&self.kind, "reminder kind", ReminderKind::from_str)?,
            sequence: self.sequence as u32,
            total_expected: self.total_expected as u32,
            days_offset: self.days_offset,
            priority: parse_enum(&self.priority, "priority", Priority::from_str)?,
            template_id: self.template_id,
            state: parse_enum(&self.state, "reminder state", ReminderState::from_str)?,
            delivered_at: parse_optional_datetime(self.delivered_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteArtifactStore};
    use crate::domain::models::reminder::expand_plan;
    use crate::domain::models::{Artifact, ArtifactKind, ReminderPlan};
    use crate::domain::ports::ArtifactStore;
    use chrono::Duration;

    async fn setup() -> (SqliteReminderRepository, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let artifact = Artifact::new(ArtifactKind::Threshold, "PTA");
        SqliteArtifactStore::new(pool.clone()).create(&artifact).await.unwrap();
        (SqliteReminderRepository::new(pool), artifact.id)
    }

    #[tokio::test]
    async fn test_insert_ignores_duplicates() {
        let (repo, artifact_id) = setup().await;
        let now = Utc::now();
        let due = now + Duration::days(60);

        let first = expand_plan(artifact_id, "review", due, &ReminderPlan::default(), now);
        let again = expand_plan(artifact_id, "review", due, &ReminderPlan::default(), now);

        assert_eq!(repo.insert_many(&first).await.unwrap(), 6);
        assert_eq!(repo.insert_many(&again).await.unwrap(), 0);
        assert_eq!(repo.list_for_artifact(artifact_id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_due_and_claim_once() {
        let (repo, artifact_id) = setup().await;
        let now = Utc::now();
        let due = now + Duration::days(60);
        repo.insert_many(&expand_plan(artifact_id, "review", due, &ReminderPlan::default(), now))
            .await
            .unwrap();

        assert!(repo.due(now, 10).await.unwrap().is_empty());

        let later = due - Duration::days(13);
        let due_now = repo.due(later, 10).await.unwrap();
        assert_eq!(due_now.len(), 2);

        assert!(repo.claim(due_now[0].id).await.unwrap());
        assert!(!repo.claim(due_now[0].id).await.unwrap());
        repo.mark_delivered(due_now[0].id, later).await.unwrap();

        let remaining = repo.due(later, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_only_removes_pending() {
        let (repo, artifact_id) = setup().await;
        let now = Utc::now();
        let due = now + Duration::days(60);
        repo.insert_many(&expand_plan(artifact_id, "review", due, &ReminderPlan::default(), now))
            .await
            .unwrap();

        let first = repo.due(due - Duration::days(30), 1).await.unwrap().remove(0);
        repo.claim(first.id).await.unwrap();
        repo.mark_delivered(first.id, now).await.unwrap();

        assert_eq!(repo.cancel_pending(artifact_id).await.unwrap(), 5);
        let left = repo.list_for_artifact(artifact_id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].state, ReminderState::Delivered);
    }
}
