//! Deadline reminder scheduling and delivery.
//!
//! Reminders are persisted rows expanded from a [`ReminderPlan`]. A tick
//! claims each due row atomically while holding the artifact's lock, so a
//! reminder fires at most once even with overlapping ticks, and a concurrent
//! transition that cancels it either runs first (the claim fails) or waits
//! until delivery is done.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    expand_plan, Artifact, NotificationCategory, RecipientSpec, ReminderConfig, ReminderKind,
    ReminderPlan, ReminderState, ScheduledReminder,
};
use crate::domain::ports::{ArtifactStore, ReminderRepository, WorkflowRepository};
use crate::services::artifact_locks::ArtifactLocks;
use crate::services::notification_dispatcher::{Notification, NotificationDispatcher};
use crate::services::observability::SideEffectCounters;
use crate::services::stage_registry::StageRegistry;
use crate::services::template::TemplateData;

/// Role escalated to once a deadline has passed.
const OVERDUE_ROLE: &str = "privacy_officer";

/// Due reminders handled per tick.
const TICK_BATCH: usize = 200;

pub struct ReminderScheduler {
    repo: Arc<dyn ReminderRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    workflows: Arc<dyn WorkflowRepository>,
    registry: Arc<StageRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    locks: Arc<ArtifactLocks>,
    counters: Arc<SideEffectCounters>,
    plan: ReminderPlan,
}

impl ReminderScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn ReminderRepository>,
        artifacts: Arc<dyn ArtifactStore>,
        workflows: Arc<dyn WorkflowRepository>,
        registry: Arc<StageRegistry>,
        dispatcher: Arc<NotificationDispatcher>,
        locks: Arc<ArtifactLocks>,
        counters: Arc<SideEffectCounters>,
        config: &ReminderConfig,
    ) -> Self {
        Self {
            repo,
            artifacts,
            workflows,
            registry,
            dispatcher,
            locks,
            counters,
            plan: ReminderPlan::from_days(&config.approaching_days, &config.overdue_days),
        }
    }

    /// The plan used when a caller does not pass one.
    pub fn default_plan(&self) -> &ReminderPlan {
        &self.plan
    }

    /// Schedule reminders for the artifact's current stage.
    ///
    /// Returns the number of reminders stored. Scheduling the same due date
    /// twice stores nothing new.
    pub async fn schedule(
        &self,
        artifact_id: Uuid,
        due_at: DateTime<Utc>,
        plan: Option<&ReminderPlan>,
    ) -> DomainResult<usize> {
        let _guard = self.locks.lock(artifact_id).await;
        let state = self
            .workflows
            .get_state(artifact_id)
            .await?
            .ok_or(DomainError::ArtifactNotFound(artifact_id))?;
        self.schedule_locked(artifact_id, &state.current_stage, due_at, plan).await
    }

    /// Schedule reminders for `stage`. The caller holds the artifact's lock.
    pub(crate) async fn schedule_locked(
        &self,
        artifact_id: Uuid,
        stage: &str,
        due_at: DateTime<Utc>,
        plan: Option<&ReminderPlan>,
    ) -> DomainResult<usize> {
        let plan = plan.unwrap_or(&self.plan);
        let reminders = expand_plan(artifact_id, stage, due_at, plan, Utc::now());
        let stored = self.repo.insert_many(&reminders).await?;

        tracing::debug!(
            artifact_id = %artifact_id,
            stage = %stage,
            due_at = %due_at,
            stored,
            "scheduled reminders"
        );
        Ok(stored)
    }

    /// Remove every pending reminder of the artifact.
    pub async fn cancel(&self, artifact_id: Uuid) -> DomainResult<usize> {
        let _guard = self.locks.lock(artifact_id).await;
        self.cancel_locked(artifact_id).await
    }

    /// [`cancel`](Self::cancel) for callers already holding the lock.
    pub(crate) async fn cancel_locked(&self, artifact_id: Uuid) -> DomainResult<usize> {
        let removed = self.repo.cancel_pending(artifact_id).await?;
        if removed > 0 {
            tracing::debug!(artifact_id = %artifact_id, removed, "cancelled pending reminders");
        }
        Ok(removed)
    }

    pub async fn list(&self, artifact_id: Uuid) -> DomainResult<Vec<ScheduledReminder>> {
        self.repo.list_for_artifact(artifact_id).await
    }

    /// Deliver every reminder due now.
    pub async fn tick(&self) -> DomainResult<Vec<ScheduledReminder>> {
        self.tick_at(Utc::now()).await
    }

    /// Deliver every reminder due at `now`. Returns the reminders this call
    /// delivered; reminders claimed by a concurrent tick are not included.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> DomainResult<Vec<ScheduledReminder>> {
        let due = self.repo.due(now, TICK_BATCH).await?;
        let mut fired = Vec::new();

        for mut reminder in due {
            let _guard = self.locks.lock(reminder.artifact_id).await;
            if !self.repo.claim(reminder.id).await? {
                continue;
            }

            self.deliver(&reminder).await;

            let delivered_at = Utc::now();
            self.repo.mark_delivered(reminder.id, delivered_at).await?;
            self.counters.reminder_delivered();
            reminder.state = ReminderState::Delivered;
            reminder.delivered_at = Some(delivered_at);
            fired.push(reminder);
        }

        if !fired.is_empty() {
            tracing::info!(delivered = fired.len(), "reminder tick complete");
        }
        Ok(fired)
    }

    async fn deliver(&self, reminder: &ScheduledReminder) {
        let artifact = match self.artifacts.get(reminder.artifact_id).await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                tracing::warn!(artifact_id = %reminder.artifact_id, "reminder for missing artifact dropped");
                return;
            }
            Err(e) => {
                self.counters.notification_failed();
                tracing::warn!(artifact_id = %reminder.artifact_id, error = %e, "cannot load artifact for reminder");
                return;
            }
        };

        let data = self.template_data(&artifact, reminder);
        let mut audiences = Vec::new();
        if let Some(owner) = &artifact.owner {
            audiences.push(RecipientSpec::Users(vec![owner.clone()]));
        }
        audiences.push(RecipientSpec::Stakeholders {
            artifact_id: artifact.id,
            category: NotificationCategory::StatusChange,
        });
        if reminder.kind == ReminderKind::Overdue {
            audiences.push(RecipientSpec::Roles(vec![OVERDUE_ROLE.to_string()]));
        }

        for recipients in audiences {
            let notification = Notification::new(&reminder.template_id, recipients)
                .with_priority(reminder.priority)
                .with_data(data.clone());
            if let Err(e) = self.dispatcher.send(&notification).await {
                self.counters.notification_failed();
                tracing::warn!(
                    artifact_id = %reminder.artifact_id,
                    stage = %reminder.stage,
                    template_id = %reminder.template_id,
                    error = %e,
                    "reminder notification failed"
                );
            }
        }
    }

    fn template_data(&self, artifact: &Artifact, reminder: &ScheduledReminder) -> TemplateData {
        let stage_title = self
            .registry
            .stage(artifact.kind, &reminder.stage)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| reminder.stage.clone());
        let days_past_due = reminder.days_past_due();

        let mut data = TemplateData::new();
        data.insert("artifact_id".to_string(), artifact.id.to_string());
        data.insert("title".to_string(), artifact.title.clone());
        data.insert("kind".to_string(), artifact.kind.to_string());
        data.insert("stage".to_string(), reminder.stage.clone());
        data.insert("stage_title".to_string(), stage_title);
        data.insert("due_date".to_string(), reminder.due_at.format("%Y-%m-%d").to_string());
        data.insert("days_until_due".to_string(), (-days_past_due).max(0).to_string());
        data.insert("days_overdue".to_string(), days_past_due.max(0).to_string());
        data.insert("sequence".to_string(), reminder.sequence.to_string());
        data.insert("total_expected".to_string(), reminder.total_expected.to_string());
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ArtifactKind, Priority};
    use crate::services::test_support::Harness;
    use chrono::Duration;

    async fn at_stage(h: &Harness, stage: &str) -> Uuid {
        let id = h.create_artifact(ArtifactKind::Collection, "Visitor log", Some("carl")).await;
        h.seed_state(id, ArtifactKind::Collection, stage).await;
        id
    }

    #[tokio::test]
    async fn test_schedule_is_idempotent_per_due_date() {
        let h = Harness::new().await;
        let id = at_stage(&h, "pta_review").await;
        let due = Utc::now() + Duration::days(60);

        assert_eq!(h.scheduler.schedule(id, due, None).await.unwrap(), 6);
        assert_eq!(h.scheduler.schedule(id, due, None).await.unwrap(), 0);
        assert_eq!(h.scheduler.list(id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_schedule_unknown_artifact() {
        let h = Harness::new().await;
        let err = h
            .scheduler
            .schedule(Uuid::new_v4(), Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ArtifactNotFound(_)));
    }

    #[tokio::test]
    async fn test_tick_fires_each_reminder_once() {
        let h = Harness::new().await;
        let id = at_stage(&h, "pta_review").await;
        let due = Utc::now() + Duration::days(10);
        h.scheduler.schedule(id, due, None).await.unwrap();

        // Nothing is due yet
        assert!(h.scheduler.tick_at(Utc::now()).await.unwrap().is_empty());

        let later = due - Duration::days(7) + Duration::minutes(1);
        let fired = h.scheduler.tick_at(later).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, ReminderKind::Approaching);
        assert_eq!(fired[0].sequence, 1);
        assert_eq!(fired[0].total_expected, 2);
        assert_eq!(fired[0].state, ReminderState::Delivered);

        assert!(h.scheduler.tick_at(later).await.unwrap().is_empty());
        assert_eq!(h.counters.snapshot().reminders_delivered, 1);

        let emails = h.emails().await;
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, "carl@example.org");
        assert!(emails[0].1.contains("due in 7 days"));
    }

    #[tokio::test]
    async fn test_concurrent_ticks_deliver_once() {
        let h = Harness::new().await;
        let id = at_stage(&h, "pia_review").await;
        let due = Utc::now() + Duration::days(2);
        h.scheduler.schedule(id, due, None).await.unwrap();
        let after_all = due + Duration::days(8);

        let (a, b, c) = tokio::join!(
            h.scheduler.tick_at(after_all),
            h.scheduler.tick_at(after_all),
            h.scheduler.tick_at(after_all),
        );
        let total = a.unwrap().len() + b.unwrap().len() + c.unwrap().len();

        // -1 approaching, +1 and +7 overdue
        assert_eq!(total, 3);
        assert_eq!(h.counters.snapshot().reminders_delivered, 3);
        assert!(h
            .scheduler
            .list(id)
            .await
            .unwrap()
            .iter()
            .all(|r| r.state == ReminderState::Delivered));
    }

    #[tokio::test]
    async fn test_overdue_reminder_escalates_to_privacy_officer() {
        let h = Harness::new().await;
        let id = at_stage(&h, "pia_review").await;
        let due = Utc::now() + Duration::hours(1);
        h.scheduler.schedule(id, due, None).await.unwrap();

        let fired = h.scheduler.tick_at(due + Duration::days(1) + Duration::minutes(1)).await.unwrap();
        let overdue: Vec<_> = fired.iter().filter(|r| r.kind == ReminderKind::Overdue).collect();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].priority, Priority::High);

        let recipients: Vec<String> = h
            .emails()
            .await
            .into_iter()
            .filter(|(_, subject)| subject.starts_with("OVERDUE"))
            .map(|(to, _)| to)
            .collect();
        assert!(recipients.contains(&"carl@example.org".to_string()));
        assert!(recipients.contains(&"olivia@example.org".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_removes_only_pending() {
        let h = Harness::new().await;
        let id = at_stage(&h, "pta_review").await;
        let due = Utc::now() + Duration::days(3);
        h.scheduler.schedule(id, due, None).await.unwrap();
        h.scheduler.tick_at(due - Duration::days(1) + Duration::minutes(1)).await.unwrap();

        let removed = h.scheduler.cancel(id).await.unwrap();
        assert_eq!(removed, 2);

        let left = h.scheduler.list(id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].state, ReminderState::Delivered);
        assert!(h.scheduler.tick_at(due + Duration::days(30)).await.unwrap().is_empty());
    }
}
