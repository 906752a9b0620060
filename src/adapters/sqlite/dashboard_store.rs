//! SQLite implementation of the DashboardStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_enum, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::DomainResult;
use crate::domain::models::{DashboardNotification, Priority};
use crate::domain::ports::DashboardStore;

#[derive(Clone)]
pub struct SqliteDashboardStore {
    pool: SqlitePool,
}

impl SqliteDashboardStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DashboardStore for SqliteDashboardStore {
    async fn save(&self, notification: &DashboardNotification) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO dashboard_notifications
             (id, user_id, template_id, title, message, priority, artifact_id, is_read, created_at, read_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(notification.id.to_string())
        .bind(&notification.user_id)
        .bind(&notification.template_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.priority.as_str())
        .bind(notification.artifact_id.map(|id| id.to_string()))
        .bind(notification.is_read)
        .bind(notification.created_at.to_rfc3339())
        .bind(notification.read_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str, unread_only: bool) -> DomainResult<Vec<DashboardNotification>> {
        let sql = if unread_only {
            "SELECT id, user_id, template_id, title, message, priority, artifact_id, is_read, created_at, read_at
             FROM dashboard_notifications WHERE user_id = ? AND is_read = 0 ORDER BY created_at DESC"
        } else {
            "SELECT id, user_id, template_id, title, message, priority, artifact_id, is_read, created_at, read_at
             FROM dashboard_notifications WHERE user_id = ? ORDER BY created_at DESC"
        };

        let rows: Vec<DashboardRow> = sqlx::query_as(sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(DashboardRow::try_into_notification).collect()
    }

    async fn mark_read(&self, id: Uuid) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE dashboard_notifications SET is_read = 1, read_at = COALESCE(read_at, ?) WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct DashboardRow {
    id: String,
    user_id: String,
    template_id: String,
    title: String,
    message: String,
    priority: String,
    artifact_id: Option<String>,
    is_read: bool,
    created_at: String,
    read_at: Option<String>,
}

impl DashboardRow {
    fn try_into_notification(self) -> DomainResult<DashboardNotification> {
        Ok(DashboardNotification {
            id: parse_uuid(&self.id)?,
            user_id: self.user_id,
            template_id: self.template_id,
            title: self.title,
            message: self.message,
            priority: parse_enum(&self.priority, "priority", Priority::from_str)?,
            artifact_id: parse_optional_uuid(self.artifact_id)?,
            is_read: self.is_read,
            created_at: parse_datetime(&self.created_at)?,
            read_at: parse_optional_datetime(self.read_at)?,
        })
    }
}
