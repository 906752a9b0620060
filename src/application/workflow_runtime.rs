//! Workflow runtime.
//!
//! Wires the SQLite adapters, notification sinks, event bus and services into
//! one object that the CLI (and embedding applications) drive. Inbound events
//! from the content store enter here; the periodic reminder tick and its
//! overdue escalation run here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapters::identity::StaticIdentityResolver;
use crate::adapters::sqlite::{
    initialize_database, SqliteArtifactStore, SqliteDashboardStore, SqliteEmailOutbox, SqliteReminderRepository,
    SqliteWorkflowRepository,
};
use crate::adapters::webhook::HttpChatWebhook;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Artifact, ArtifactFields, ArtifactKind, Config, DashboardNotification, ReminderKind, ScheduledReminder,
    StageTransitionRecord, WorkflowMetrics, WorkflowProgress, WorkflowStage, WorkflowState,
};
use crate::domain::ports::{ArtifactStore, DashboardStore};
use crate::services::{
    ArtifactLocks, CounterSnapshot, DeliverySinks, EventBus, EventBusConfig, EventEnvelope, NotificationDispatcher,
    NotificationHandler, ReminderScheduler, SideEffectCounters, StageRegistry, TemplateRegistry, TrackerHandler,
    TransitionOutcome, WorkflowStateMachine, WorkflowTracker, SYSTEM_ACTOR,
};

/// Templates the runtime itself sends, beyond those named by stage definitions.
const RUNTIME_TEMPLATES: [&str; 4] = [
    "stage_changed",
    "dependent_created",
    "deadline_approaching",
    "deadline_overdue",
];

/// Result of one reminder tick.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// Reminders delivered by this tick.
    pub delivered: Vec<ScheduledReminder>,
    /// Artifacts moved to their stage's `on_overdue` target.
    pub escalated: Vec<TransitionOutcome>,
    /// Artifacts flagged blocked after the grace period.
    pub blocked: Vec<Uuid>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.escalated.is_empty() && self.blocked.is_empty()
    }
}

/// The assembled workflow and notification engine.
pub struct WorkflowRuntime {
    config: Config,
    artifacts: Arc<SqliteArtifactStore>,
    dashboard: Arc<SqliteDashboardStore>,
    registry: Arc<StageRegistry>,
    bus: Arc<EventBus>,
    tracker: Arc<WorkflowTracker>,
    scheduler: Arc<ReminderScheduler>,
    engine: Arc<WorkflowStateMachine>,
    counters: Arc<SideEffectCounters>,
}

impl WorkflowRuntime {
    /// Open the configured database and assemble the runtime.
    pub async fn open(config: Config) -> DomainResult<Self> {
        let pool = initialize_database(&config.database)
            .await
            .map_err(|e| DomainError::DatabaseError(e.to_string()))?;
        Self::from_pool(pool, config).await
    }

    /// Assemble the runtime over an already-migrated pool, loading templates
    /// from `notifications.templates_dir` when set.
    pub async fn from_pool(pool: SqlitePool, config: Config) -> DomainResult<Self> {
        let templates = match &config.notifications.templates_dir {
            Some(dir) => TemplateRegistry::with_overrides(dir)?,
            None => TemplateRegistry::builtin(),
        };
        Self::with_templates(pool, config, templates).await
    }

    /// Assemble the runtime with an explicit template registry.
    ///
    /// # Errors
    /// Returns [`DomainError::Configuration`] when a stage or the runtime
    /// references a template the registry does not have.
    pub async fn with_templates(pool: SqlitePool, config: Config, templates: TemplateRegistry) -> DomainResult<Self> {
        let registry = Arc::new(StageRegistry::builtin(&config.workflow)?);

        let mut missing: Vec<&str> = registry
            .referenced_templates()
            .into_iter()
            .chain(RUNTIME_TEMPLATES)
            .filter(|id| !templates.contains(id))
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            missing.dedup();
            return Err(DomainError::Configuration(format!(
                "templates referenced but not defined: {}",
                missing.join(", ")
            )));
        }

        let counters = Arc::new(SideEffectCounters::new());
        let locks = Arc::new(ArtifactLocks::new());
        let timeout = Duration::from_secs(config.notifications.delivery_timeout_secs);

        let artifacts = Arc::new(SqliteArtifactStore::new(pool.clone()));
        let workflows = Arc::new(SqliteWorkflowRepository::new(pool.clone()));
        let dashboard = Arc::new(SqliteDashboardStore::new(pool.clone()));
        let webhook = HttpChatWebhook::from_config(&config.notifications.chat_webhook, timeout)?;

        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(templates),
            Arc::new(StaticIdentityResolver::new(&config.identities)),
            artifacts.clone(),
            DeliverySinks {
                email: Arc::new(SqliteEmailOutbox::new(pool.clone())),
                dashboard: dashboard.clone(),
                webhook: Arc::new(webhook),
            },
            counters.clone(),
            timeout,
        ));

        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::new(SqliteReminderRepository::new(pool)),
            artifacts.clone(),
            workflows.clone(),
            registry.clone(),
            dispatcher.clone(),
            locks.clone(),
            counters.clone(),
            &config.reminders,
        ));

        let bus = Arc::new(EventBus::new(
            EventBusConfig {
                channel_capacity: config.workflow.event_channel_capacity,
                ..EventBusConfig::default()
            },
            counters.clone(),
        ));
        let tracker = Arc::new(WorkflowTracker::new(registry.clone(), workflows.clone()));
        bus.register(Arc::new(TrackerHandler::new(tracker.clone()))).await;
        bus.register(Arc::new(NotificationHandler::new(
            dispatcher,
            registry.clone(),
            artifacts.clone(),
        )))
        .await;

        let engine = Arc::new(WorkflowStateMachine::new(
            registry.clone(),
            artifacts.clone(),
            workflows,
            scheduler.clone(),
            bus.clone(),
            locks,
            counters.clone(),
        ));

        info!(
            handlers = ?bus.handler_names().await,
            webhook = config.notifications.chat_webhook.is_active(),
            "workflow runtime ready"
        );

        Ok(Self {
            config,
            artifacts,
            dashboard,
            registry,
            bus,
            tracker,
            scheduler,
            engine,
            counters,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &WorkflowStateMachine {
        &self.engine
    }

    /// Receive every published workflow event.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.bus.subscribe()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    // Content store

    /// Store a new artifact and start its workflow.
    pub async fn create_artifact(
        &self,
        kind: ArtifactKind,
        title: &str,
        owner: Option<&str>,
        fields: ArtifactFields,
        actor: &str,
    ) -> DomainResult<(Artifact, WorkflowState)> {
        let mut artifact = Artifact::new(kind, title).with_fields(fields);
        if let Some(owner) = owner {
            artifact = artifact.with_owner(owner);
        }
        let id = self.artifacts.create(&artifact).await?;
        let state = self.engine.artifact_created(id, actor).await?;
        let artifact = self.artifact(id).await?;
        Ok((artifact, state))
    }

    pub async fn artifact(&self, artifact_id: Uuid) -> DomainResult<Artifact> {
        self.artifacts
            .get(artifact_id)
            .await?
            .ok_or(DomainError::ArtifactNotFound(artifact_id))
    }

    pub async fn artifacts(&self, kind: Option<ArtifactKind>) -> DomainResult<Vec<Artifact>> {
        self.artifacts.list(kind).await
    }

    /// Inbound `artifact.created`.
    pub async fn artifact_created(&self, artifact_id: Uuid, actor: &str) -> DomainResult<WorkflowState> {
        self.engine.artifact_created(artifact_id, actor).await
    }

    /// Inbound `artifact.status_changed`.
    pub async fn status_changed(
        &self,
        artifact_id: Uuid,
        old_status: &str,
        new_status: &str,
    ) -> DomainResult<Option<TransitionOutcome>> {
        self.engine
            .record_external_status_change(artifact_id, old_status, new_status)
            .await
    }

    /// Change the store status of an artifact and react to the change.
    pub async fn set_status(&self, artifact_id: Uuid, status: &str) -> DomainResult<Option<TransitionOutcome>> {
        let artifact = self.artifact(artifact_id).await?;
        if artifact.status == status {
            return Ok(None);
        }
        self.artifacts.set_status(artifact_id, status).await?;
        self.status_changed(artifact_id, &artifact.status, status).await
    }

    // Workflow

    pub async fn transition(
        &self,
        artifact_id: Uuid,
        target: &str,
        actor: &str,
        comment: Option<String>,
    ) -> DomainResult<TransitionOutcome> {
        self.engine.transition(artifact_id, target, actor, comment).await
    }

    pub async fn transition_if_version(
        &self,
        artifact_id: Uuid,
        expected_version: u64,
        target: &str,
        actor: &str,
        comment: Option<String>,
    ) -> DomainResult<TransitionOutcome> {
        self.engine
            .transition_if_version(artifact_id, expected_version, target, actor, comment)
            .await
    }

    pub async fn set_blocked(
        &self,
        artifact_id: Uuid,
        blocked: bool,
        actor: &str,
        reason: Option<String>,
    ) -> DomainResult<WorkflowState> {
        self.engine.set_blocked(artifact_id, blocked, actor, reason).await
    }

    pub async fn state(&self, artifact_id: Uuid) -> DomainResult<Option<WorkflowState>> {
        self.engine.state(artifact_id).await
    }

    pub async fn progress(&self, artifact_id: Uuid) -> DomainResult<WorkflowProgress> {
        self.tracker.progress(artifact_id).await
    }

    pub async fn metrics(&self, artifact_id: Uuid) -> DomainResult<WorkflowMetrics> {
        self.tracker.metrics(artifact_id).await
    }

    pub async fn history(&self, artifact_id: Uuid) -> DomainResult<Vec<StageTransitionRecord>> {
        self.tracker.history(artifact_id).await
    }

    pub fn stages(&self, kind: ArtifactKind) -> &[WorkflowStage] {
        self.registry.stages_for(kind)
    }

    // Reminders

    pub async fn reminders(&self, artifact_id: Uuid) -> DomainResult<Vec<ScheduledReminder>> {
        self.scheduler.list(artifact_id).await
    }

    /// Inbound `timer.tick`.
    pub async fn tick(&self) -> DomainResult<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Deliver due reminders, then escalate artifacts whose overdue
    /// reminders fired while they are still in the reminded stage.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> DomainResult<TickReport> {
        let delivered = self.scheduler.tick_at(now).await?;
        let mut report = TickReport {
            delivered,
            ..TickReport::default()
        };

        let overdue: Vec<ScheduledReminder> = report
            .delivered
            .iter()
            .filter(|r| r.kind == ReminderKind::Overdue)
            .cloned()
            .collect();
        for reminder in overdue {
            self.escalate(&reminder, &mut report).await;
        }

        Ok(report)
    }

    async fn escalate(&self, reminder: &ScheduledReminder, report: &mut TickReport) {
        let artifact_id = reminder.artifact_id;
        let state = match self.engine.state(artifact_id).await {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(e) => {
                warn!(artifact_id = %artifact_id, error = %e, "failed to read state for escalation");
                return;
            }
        };
        if state.current_stage != reminder.stage {
            return;
        }

        let on_overdue = self
            .registry
            .stage(state.kind, &state.current_stage)
            .and_then(|stage| stage.deadline.as_ref())
            .and_then(|deadline| deadline.on_overdue.clone());

        if let Some(target) = on_overdue {
            let comment = format!("deadline {} passed", reminder.due_at.format("%Y-%m-%d"));
            match self.engine.transition(artifact_id, &target, SYSTEM_ACTOR, Some(comment)).await {
                Ok(outcome) => {
                    info!(
                        artifact_id = %artifact_id,
                        from = %reminder.stage,
                        to = %target,
                        "overdue stage escalated"
                    );
                    report.escalated.push(outcome);
                }
                Err(e) => {
                    error!(artifact_id = %artifact_id, stage = %reminder.stage, target = %target, error = %e, "overdue escalation failed");
                }
            }
            return;
        }

        let days = reminder.days_past_due();
        if days < self.config.workflow.blocked_grace_days || state.is_blocked() {
            return;
        }
        let reason = format!("{days} days past due");
        match self.engine.set_blocked(artifact_id, true, SYSTEM_ACTOR, Some(reason)).await {
            Ok(_) => {
                info!(artifact_id = %artifact_id, stage = %reminder.stage, days_past_due = days, "stage blocked after grace period");
                report.blocked.push(artifact_id);
            }
            Err(e) => {
                error!(artifact_id = %artifact_id, stage = %reminder.stage, error = %e, "failed to block overdue stage");
            }
        }
    }

    /// Tick every `workflow.reminder_tick_secs` until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(Duration::from_secs(self.config.workflow.reminder_tick_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_secs = self.config.workflow.reminder_tick_secs, "reminder loop started");
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(counters = ?self.counters.snapshot(), "reminder loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if !report.is_empty() => info!(
                            delivered = report.delivered.len(),
                            escalated = report.escalated.len(),
                            blocked = report.blocked.len(),
                            "tick processed"
                        ),
                        Ok(_) => debug!("tick found nothing due"),
                        Err(e) => error!(error = %e, "reminder tick failed"),
                    }
                }
            }
        }
    }

    // Dashboard inbox

    pub async fn inbox(&self, user_id: &str, unread_only: bool) -> DomainResult<Vec<DashboardNotification>> {
        self.dashboard.list_for_user(user_id, unread_only).await
    }

    pub async fn mark_read(&self, notification_id: Uuid) -> DomainResult<bool> {
        self.dashboard.mark_read(notification_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::services::template::builtin_templates;

    #[tokio::test]
    async fn test_missing_template_is_configuration_error() {
        let pool = create_migrated_test_pool().await.unwrap();
        let templates = TemplateRegistry::new(
            builtin_templates()
                .into_iter()
                .filter(|t| t.id != "pta_required")
                .collect(),
        );

        let result = WorkflowRuntime::with_templates(pool, Config::default(), templates).await;
        match result {
            Err(DomainError::Configuration(msg)) => assert!(msg.contains("pta_required")),
            other => panic!("expected configuration error, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_set_status_same_value_is_noop() {
        let pool = create_migrated_test_pool().await.unwrap();
        let runtime = WorkflowRuntime::from_pool(pool, Config::default()).await.unwrap();
        let (artifact, _) = runtime
            .create_artifact(ArtifactKind::Collection, "Survey", None, ArtifactFields::default(), "carl")
            .await
            .unwrap();

        assert!(runtime.set_status(artifact.id, &artifact.status).await.unwrap().is_none());
        assert_eq!(runtime.history(artifact.id).await.unwrap().len(), 1);
    }
}
