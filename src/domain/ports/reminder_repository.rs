//! Reminder repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::ScheduledReminder;

/// Repository interface for scheduled reminders.
#[async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Insert reminders, ignoring any that duplicate an existing
    /// (artifact, stage, due date, kind, sequence). Returns the number
    /// inserted.
    async fn insert_many(&self, reminders: &[ScheduledReminder]) -> DomainResult<usize>;

    /// Pending reminders with `fire_at <= now`, oldest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<ScheduledReminder>>;

    /// Atomically move a reminder from pending to sending.
    ///
    /// Returns `false` when it was already claimed, delivered or cancelled.
    async fn claim(&self, id: Uuid) -> DomainResult<bool>;

    /// Mark a claimed reminder delivered.
    async fn mark_delivered(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;

    /// Delete every pending reminder of an artifact. Returns the number removed.
    async fn cancel_pending(&self, artifact_id: Uuid) -> DomainResult<usize>;

    /// All reminders of an artifact in fire order.
    async fn list_for_artifact(&self, artifact_id: Uuid) -> DomainResult<Vec<ScheduledReminder>>;
}
