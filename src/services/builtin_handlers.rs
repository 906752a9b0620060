//! Built-in event handlers wired onto the event bus at startup.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{ArtifactKind, Channel, NotificationCategory, RecipientRule, RecipientSpec};
use crate::domain::ports::ArtifactStore;
use crate::services::event_bus::{EventEnvelope, EventHandler, HandlerMetadata, Reaction, WorkflowEvent};
use crate::services::notification_dispatcher::{Notification, NotificationDispatcher};
use crate::services::stage_registry::StageRegistry;
use crate::services::template::TemplateData;
use crate::services::workflow_tracker::WorkflowTracker;

/// Recomputes progress whenever the stage or its flag changes and publishes
/// the snapshot as `workflow.progress_updated`.
pub struct TrackerHandler {
    tracker: Arc<WorkflowTracker>,
}

impl TrackerHandler {
    pub fn new(tracker: Arc<WorkflowTracker>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl EventHandler for TrackerHandler {
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            name: "tracker",
            event_types: vec!["workflow.stage_changed", "workflow.blocked_changed"],
        }
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<Reaction, String> {
        let artifact_id = event.payload.artifact_id();
        let progress = self.tracker.progress(artifact_id).await.map_err(|e| e.to_string())?;
        tracing::debug!(
            artifact_id = %artifact_id,
            stage = %progress.current_stage,
            completion = progress.completion_percentage,
            "progress recomputed"
        );
        Ok(Reaction::EmitEvents(vec![WorkflowEvent::ProgressUpdated { artifact_id, progress }]))
    }
}

/// Sends stage-entry notifications, the generic stage-change notice to
/// stakeholders, and the dependent-created inbox entry.
pub struct NotificationHandler {
    dispatcher: Arc<NotificationDispatcher>,
    registry: Arc<StageRegistry>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl NotificationHandler {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        registry: Arc<StageRegistry>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            artifacts,
        }
    }

    fn stage_title(&self, kind: ArtifactKind, stage: &str) -> String {
        self.registry
            .stage(kind, stage)
            .map(|s| s.title.clone())
            .unwrap_or_else(|| stage.to_string())
    }

    fn recipients(rule: &RecipientRule, artifact_id: Uuid, owner: Option<&str>) -> RecipientSpec {
        match rule {
            RecipientRule::Roles(roles) => RecipientSpec::Roles(roles.clone()),
            RecipientRule::Owner => match owner {
                Some(owner) => RecipientSpec::Users(vec![owner.to_string()]),
                None => RecipientSpec::Nobody,
            },
            RecipientRule::Stakeholders(category) => RecipientSpec::Stakeholders {
                artifact_id,
                category: *category,
            },
        }
    }

    /// Send every notification; report the failures together.
    async fn send_all(&self, notifications: Vec<Notification>) -> Result<Reaction, String> {
        let mut errors = Vec::new();
        for notification in notifications {
            if let Err(e) = self.dispatcher.send(&notification).await {
                errors.push(format!("{}: {e}", notification.template_id));
            }
        }
        if errors.is_empty() {
            Ok(Reaction::None)
        } else {
            Err(errors.join("; "))
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_stage_changed(
        &self,
        artifact_id: Uuid,
        kind: ArtifactKind,
        title: &str,
        old_stage: Option<&str>,
        new_stage: &str,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<Reaction, String> {
        let owner = self
            .artifacts
            .get(artifact_id)
            .await
            .map_err(|e| e.to_string())?
            .and_then(|a| a.owner);

        let mut data = TemplateData::new();
        data.insert("artifact_id".to_string(), artifact_id.to_string());
        data.insert("title".to_string(), title.to_string());
        data.insert("kind".to_string(), kind.to_string());
        data.insert("actor".to_string(), actor.to_string());
        data.insert("new_stage".to_string(), new_stage.to_string());
        data.insert("new_stage_title".to_string(), self.stage_title(kind, new_stage));
        data.insert("comment".to_string(), comment.unwrap_or_default().to_string());
        if let Some(old) = old_stage {
            data.insert("old_stage".to_string(), old.to_string());
            data.insert("old_stage_title".to_string(), self.stage_title(kind, old));
        }

        let rules = self
            .registry
            .stage(kind, new_stage)
            .map(|stage| stage.notifications.as_slice())
            .unwrap_or_default();
        let mut notifications: Vec<Notification> = rules
            .iter()
            .map(|n| {
                Notification::new(&n.template_id, Self::recipients(&n.recipients, artifact_id, owner.as_deref()))
                    .with_data(data.clone())
            })
            .collect();
        // Stakeholders already addressed by the stage get no generic notice
        let stakeholders_notified = rules
            .iter()
            .any(|n| matches!(n.recipients, RecipientRule::Stakeholders(_)));

        if old_stage.is_some() {
            if self.dispatcher.webhook_enabled() {
                // Team channel sees every stage change.
                notifications.push(
                    Notification::new("stage_changed", RecipientSpec::Nobody)
                        .via(Channel::ChatWebhook)
                        .with_data(data.clone()),
                );
            }
            if !stakeholders_notified {
                notifications.push(
                    Notification::new(
                        "stage_changed",
                        RecipientSpec::Stakeholders {
                            artifact_id,
                            category: NotificationCategory::StatusChange,
                        },
                    )
                    .with_data(data),
                );
            }
        }

        self.send_all(notifications).await
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            name: "notifications",
            event_types: vec!["workflow.stage_changed", "workflow.dependent_created"],
        }
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<Reaction, String> {
        match &event.payload {
            WorkflowEvent::StageChanged {
                artifact_id,
                kind,
                title,
                old_stage,
                new_stage,
                actor,
                comment,
            } => {
                self.on_stage_changed(
                    *artifact_id,
                    *kind,
                    title,
                    old_stage.as_deref(),
                    new_stage,
                    actor,
                    comment.as_deref(),
                )
                .await
            }
            WorkflowEvent::DependentCreated {
                parent_id,
                parent_title,
                dependent_id,
                dependent_kind,
                actor,
            } => {
                let owner = self
                    .artifacts
                    .get(*parent_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .and_then(|a| a.owner);
                let Some(owner) = owner else {
                    return Ok(Reaction::None);
                };

                let notification = Notification::new("dependent_created", RecipientSpec::Users(vec![owner]))
                    .set("artifact_id", parent_id)
                    .set("title", parent_title)
                    .set("dependent_id", dependent_id)
                    .set("dependent_kind", dependent_kind.label())
                    .set("actor", actor);
                self.send_all(vec![notification]).await
            }
            _ => Ok(Reaction::None),
        }
    }
}
