//! Shared wiring for service unit tests: every service over one in-memory
//! SQLite database.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::identity::StaticIdentityResolver;
use crate::adapters::sqlite::{
    create_migrated_test_pool, SqliteArtifactStore, SqliteDashboardStore, SqliteEmailOutbox,
    SqliteReminderRepository, SqliteWorkflowRepository,
};
use crate::adapters::webhook::HttpChatWebhook;
use crate::domain::models::{
    Artifact, ArtifactKind, IdentityConfig, ReminderConfig, StageFlag, StageTransitionRecord, WorkflowConfig,
    WorkflowState,
};
use crate::domain::ports::{ArtifactStore, WorkflowRepository};
use crate::services::artifact_locks::ArtifactLocks;
use crate::services::builtin_handlers::{NotificationHandler, TrackerHandler};
use crate::services::event_bus::{EventBus, EventBusConfig};
use crate::services::notification_dispatcher::{DeliverySinks, NotificationDispatcher};
use crate::services::observability::SideEffectCounters;
use crate::services::reminder_scheduler::ReminderScheduler;
use crate::services::stage_registry::StageRegistry;
use crate::services::template::TemplateRegistry;
use crate::services::workflow_engine::WorkflowStateMachine;
use crate::services::workflow_tracker::WorkflowTracker;

pub(crate) fn test_identities() -> Vec<IdentityConfig> {
    vec![
        IdentityConfig {
            id: "olivia".to_string(),
            email: "olivia@example.org".to_string(),
            display_name: Some("Olivia Park".to_string()),
            roles: vec!["privacy_officer".to_string()],
        },
        IdentityConfig {
            id: "carl".to_string(),
            email: "carl@example.org".to_string(),
            display_name: None,
            roles: vec!["collection_owner".to_string()],
        },
    ]
}

pub(crate) struct Harness {
    pub pool: SqlitePool,
    pub artifacts: Arc<SqliteArtifactStore>,
    pub workflows: Arc<SqliteWorkflowRepository>,
    pub dashboard: Arc<SqliteDashboardStore>,
    pub counters: Arc<SideEffectCounters>,
    pub bus: Arc<EventBus>,
    pub tracker: Arc<WorkflowTracker>,
    pub scheduler: Arc<ReminderScheduler>,
    pub engine: WorkflowStateMachine,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = create_migrated_test_pool().await.expect("test pool");
        let config = WorkflowConfig::default();
        let registry = Arc::new(StageRegistry::builtin(&config).expect("builtin registry"));
        let counters = Arc::new(SideEffectCounters::new());
        let locks = Arc::new(ArtifactLocks::new());

        let artifacts = Arc::new(SqliteArtifactStore::new(pool.clone()));
        let workflows = Arc::new(SqliteWorkflowRepository::new(pool.clone()));
        let dashboard = Arc::new(SqliteDashboardStore::new(pool.clone()));

        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::new(TemplateRegistry::builtin()),
            Arc::new(StaticIdentityResolver::new(&test_identities())),
            artifacts.clone(),
            DeliverySinks {
                email: Arc::new(SqliteEmailOutbox::new(pool.clone())),
                dashboard: dashboard.clone(),
                webhook: Arc::new(HttpChatWebhook::disabled()),
            },
            counters.clone(),
            Duration::from_secs(5),
        ));

        let scheduler = Arc::new(ReminderScheduler::new(
            Arc::new(SqliteReminderRepository::new(pool.clone())),
            artifacts.clone(),
            workflows.clone(),
            registry.clone(),
            dispatcher.clone(),
            locks.clone(),
            counters.clone(),
            &ReminderConfig::default(),
        ));

        let bus = Arc::new(EventBus::new(EventBusConfig::default(), counters.clone()));
        let tracker = Arc::new(WorkflowTracker::new(registry.clone(), workflows.clone()));
        bus.register(Arc::new(TrackerHandler::new(tracker.clone()))).await;
        bus.register(Arc::new(NotificationHandler::new(
            dispatcher,
            registry.clone(),
            artifacts.clone(),
        )))
        .await;

        let engine = WorkflowStateMachine::new(
            registry,
            artifacts.clone(),
            workflows.clone(),
            scheduler.clone(),
            bus.clone(),
            locks,
            counters.clone(),
        );

        Self {
            pool,
            artifacts,
            workflows,
            dashboard,
            counters,
            bus,
            tracker,
            scheduler,
            engine,
        }
    }

    /// Store an artifact without starting its workflow.
    pub async fn create_artifact(&self, kind: ArtifactKind, title: &str, owner: Option<&str>) -> Uuid {
        let mut artifact = Artifact::new(kind, title);
        if let Some(owner) = owner {
            artifact = artifact.with_owner(owner);
        }
        self.artifacts.create(&artifact).await.expect("create artifact")
    }

    /// Store an artifact owned by `carl` and start its workflow.
    pub async fn created(&self, kind: ArtifactKind, title: &str) -> Uuid {
        let id = self.create_artifact(kind, title, Some("carl")).await;
        self.engine.artifact_created(id, "carl").await.expect("artifact_created");
        id
    }

    /// Put an artifact straight at `stage`, bypassing the state machine.
    pub async fn seed_state(&self, id: Uuid, kind: ArtifactKind, stage: &str) {
        let now = Utc::now();
        let state = WorkflowState {
            artifact_id: id,
            kind,
            current_stage: stage.to_string(),
            version: 1,
            flag: StageFlag::Active,
            entered_at: now,
            updated_at: now,
        };
        let record = StageTransitionRecord::transition(id, None, stage, "seed", None).at(now);
        assert!(self.workflows.initialize(&state, &record).await.expect("seed state"));
    }

    /// `(recipient, subject)` of every queued email.
    pub async fn emails(&self) -> Vec<(String, String)> {
        sqlx::query_as("SELECT recipient, subject FROM email_outbox ORDER BY created_at, recipient")
            .fetch_all(&self.pool)
            .await
            .expect("read outbox")
    }
}
