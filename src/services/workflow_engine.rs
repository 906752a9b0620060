//! Workflow state machine.
//!
//! The `WorkflowStateMachine` owns every artifact's position in its stage
//! chain. Each mutation runs under the artifact's lock and commits through a
//! version compare-and-swap, so one stage change produces exactly one history
//! record. Entry side effects (reminders, store sync, dependent artifacts)
//! run after the commit and never undo it; outbound events are published once
//! the lock is released.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    field, Artifact, ArtifactFields, DependentSpec, HistoryEvent, StageFlag, StageTransitionRecord,
    WorkflowState, WorkflowStage,
};
use crate::domain::ports::{ArtifactStore, WorkflowRepository};
use crate::services::artifact_locks::ArtifactLocks;
use crate::services::event_bus::{EventBus, WorkflowEvent};
use crate::services::observability::SideEffectCounters;
use crate::services::reminder_scheduler::ReminderScheduler;
use crate::services::stage_registry::StageRegistry;

/// Actor recorded for changes the system makes on its own.
pub const SYSTEM_ACTOR: &str = "system";

/// Result of a transition request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub artifact_id: Uuid,
    pub from_stage: String,
    pub to_stage: String,
    /// `false` when the artifact was already at the target stage.
    pub changed: bool,
    /// Workflow version after the call.
    pub version: u64,
    /// Dependent artifact created or reused on entry to a trigger stage.
    pub dependent: Option<Uuid>,
}

pub struct WorkflowStateMachine {
    registry: Arc<StageRegistry>,
    artifacts: Arc<dyn ArtifactStore>,
    workflows: Arc<dyn WorkflowRepository>,
    reminders: Arc<ReminderScheduler>,
    bus: Arc<EventBus>,
    locks: Arc<ArtifactLocks>,
    counters: Arc<SideEffectCounters>,
}

impl WorkflowStateMachine {
    pub fn new(
        registry: Arc<StageRegistry>,
        artifacts: Arc<dyn ArtifactStore>,
        workflows: Arc<dyn WorkflowRepository>,
        reminders: Arc<ReminderScheduler>,
        bus: Arc<EventBus>,
        locks: Arc<ArtifactLocks>,
        counters: Arc<SideEffectCounters>,
    ) -> Self {
        Self {
            registry,
            artifacts,
            workflows,
            reminders,
            bus,
            locks,
            counters,
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Current workflow state, if the artifact has one.
    pub async fn state(&self, artifact_id: Uuid) -> DomainResult<Option<WorkflowState>> {
        self.workflows.get_state(artifact_id).await
    }

    /// Put a newly created artifact at its initial stage. Calling it again
    /// returns the existing state unchanged.
    pub async fn artifact_created(&self, artifact_id: Uuid, actor: &str) -> DomainResult<WorkflowState> {
        let mut events = Vec::new();
        let state = {
            let _guard = self.locks.lock(artifact_id).await;
            let artifact = self.load_artifact(artifact_id).await?;
            let (state, created) = self.ensure_state(&artifact, actor).await?;
            if created {
                if let Some(stage) = self.registry.stage(artifact.kind, &state.current_stage) {
                    self.enter_stage(&artifact, stage, state.entered_at).await;
                }
                events.push(stage_changed(&artifact, None, &state.current_stage, actor, None));
            }
            state
        };

        for event in events {
            self.bus.publish(event).await;
        }
        Ok(state)
    }

    /// Move an artifact to `target`.
    ///
    /// The version is read before waiting on the artifact's lock, so a
    /// writer that commits first turns this call into a
    /// `ConcurrencyConflict` instead of a transition from the winner's stage.
    pub async fn transition(
        &self,
        artifact_id: Uuid,
        target: &str,
        actor: &str,
        comment: Option<String>,
    ) -> DomainResult<TransitionOutcome> {
        // A missing state is created at version 1 under the lock
        let observed = self
            .workflows
            .get_state(artifact_id)
            .await?
            .map_or(1, |state| state.version);
        self.transition_inner(artifact_id, observed, target, actor, comment)
            .await
    }

    /// Move an artifact to `target` only if its workflow is still at
    /// `expected_version`; fails with `ConcurrencyConflict` otherwise.
    pub async fn transition_if_version(
        &self,
        artifact_id: Uuid,
        expected_version: u64,
        target: &str,
        actor: &str,
        comment: Option<String>,
    ) -> DomainResult<TransitionOutcome> {
        self.transition_inner(artifact_id, expected_version, target, actor, comment)
            .await
    }

    /// React to a store status change. Statuses without a stage mapping, or
    /// mapping to the current stage, change nothing.
    pub async fn record_external_status_change(
        &self,
        artifact_id: Uuid,
        old_status: &str,
        new_status: &str,
    ) -> DomainResult<Option<TransitionOutcome>> {
        let artifact = self.load_artifact(artifact_id).await?;
        let Some(target) = self.registry.stage_for_status(artifact.kind, new_status) else {
            tracing::debug!(
                artifact_id = %artifact_id,
                status = %new_status,
                "status has no workflow stage; ignoring"
            );
            return Ok(None);
        };
        let target = target.to_string();

        if let Some(state) = self.workflows.get_state(artifact_id).await? {
            if state.current_stage == target {
                return Ok(None);
            }
        }

        let comment = format!("store status changed from '{old_status}' to '{new_status}'");
        self.transition(artifact_id, &target, SYSTEM_ACTOR, Some(comment))
            .await
            .map(Some)
    }

    /// Set or clear the blocked flag on the current stage.
    pub async fn set_blocked(
        &self,
        artifact_id: Uuid,
        blocked: bool,
        actor: &str,
        reason: Option<String>,
    ) -> DomainResult<WorkflowState> {
        let (state, changed) = {
            let _guard = self.locks.lock(artifact_id).await;
            self.set_blocked_locked(artifact_id, blocked, actor, reason.clone()).await?
        };

        if changed {
            self.bus
                .publish(WorkflowEvent::BlockedChanged {
                    artifact_id,
                    stage: state.current_stage.clone(),
                    blocked,
                    actor: actor.to_string(),
                    reason,
                })
                .await;
        }
        Ok(state)
    }

    async fn set_blocked_locked(
        &self,
        artifact_id: Uuid,
        blocked: bool,
        actor: &str,
        reason: Option<String>,
    ) -> DomainResult<(WorkflowState, bool)> {
        let wanted = if blocked { StageFlag::Blocked } else { StageFlag::Active };
        let event = if blocked { HistoryEvent::Blocked } else { HistoryEvent::Unblocked };

        let mut attempt = 0;
        loop {
            let state = self
                .workflows
                .get_state(artifact_id)
                .await?
                .ok_or(DomainError::ArtifactNotFound(artifact_id))?;
            if state.flag == wanted {
                return Ok((state, false));
            }

            let now = Utc::now();
            let next = WorkflowState {
                flag: wanted,
                updated_at: now,
                ..state.clone()
            };
            let record =
                StageTransitionRecord::flag(artifact_id, &state.current_stage, actor, event, reason.clone()).at(now);

            match self.workflows.commit(state.version, &next, &record).await {
                Ok(committed) => {
                    tracing::info!(
                        artifact_id = %artifact_id,
                        stage = %committed.current_stage,
                        blocked,
                        actor = %actor,
                        "stage flag updated"
                    );
                    return Ok((committed, true));
                }
                // Another process moved the state; re-read once and retry
                Err(e) if e.is_conflict() && attempt == 0 => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    async fn transition_inner(
        &self,
        artifact_id: Uuid,
        expected_version: u64,
        target: &str,
        actor: &str,
        comment: Option<String>,
    ) -> DomainResult<TransitionOutcome> {
        let mut events = Vec::new();
        let result = self
            .transition_locked(artifact_id, expected_version, target, actor, comment, &mut events)
            .await;

        // Events describe committed changes, so they go out even when a
        // later step of the same call failed.
        for event in events {
            self.bus.publish(event).await;
        }
        result
    }

    async fn transition_locked(
        &self,
        artifact_id: Uuid,
        expected_version: u64,
        target: &str,
        actor: &str,
        comment: Option<String>,
        events: &mut Vec<WorkflowEvent>,
    ) -> DomainResult<TransitionOutcome> {
        let _guard = self.locks.lock(artifact_id).await;

        let artifact = self.load_artifact(artifact_id).await?;
        let definition = self.registry.definition(artifact.kind)?;

        let (state, created) = self.ensure_state(&artifact, actor).await?;
        if created {
            events.push(stage_changed(&artifact, None, &state.current_stage, actor, None));
        }

        if state.version != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                artifact_id,
                expected_version,
            });
        }

        if definition.is_terminal(&state.current_stage) {
            return Err(DomainError::InvalidTransition {
                from: state.current_stage.clone(),
                to: target.to_string(),
                reason: format!("'{}' is a terminal stage", state.current_stage),
            });
        }

        if state.current_stage == target {
            return Ok(TransitionOutcome {
                artifact_id,
                from_stage: state.current_stage.clone(),
                to_stage: state.current_stage,
                changed: false,
                version: state.version,
                dependent: None,
            });
        }

        let stage = definition.stage(target).ok_or_else(|| DomainError::UnknownStage {
            kind: artifact.kind.to_string(),
            stage: target.to_string(),
        })?;

        let now = Utc::now();
        let next = WorkflowState {
            current_stage: stage.id.clone(),
            flag: StageFlag::Active,
            entered_at: now,
            updated_at: now,
            ..state.clone()
        };
        let record =
            StageTransitionRecord::transition(artifact_id, Some(&state.current_stage), &stage.id, actor, comment.clone())
                .at(now);
        let mut committed = self.workflows.commit(state.version, &next, &record).await?;

        tracing::info!(
            artifact_id = %artifact_id,
            kind = %artifact.kind,
            from = %state.current_stage,
            to = %committed.current_stage,
            actor = %actor,
            version = committed.version,
            "stage changed"
        );
        events.push(stage_changed(&artifact, Some(&state.current_stage), &stage.id, actor, comment));

        self.enter_stage(&artifact, stage, now).await;

        let mut dependent = None;
        if let Some(spec) = &stage.dependent {
            match self.ensure_dependent(&artifact, spec, actor, events).await {
                Ok(id) => dependent = Some(id),
                Err(e) => {
                    self.counters.dependent_failed();
                    tracing::error!(
                        artifact_id = %artifact_id,
                        stage = %stage.id,
                        dependent_kind = %spec.kind,
                        error = %e,
                        "dependent artifact creation failed"
                    );
                    committed = self
                        .record_error(committed, actor, format!("{} creation failed: {e}", spec.kind))
                        .await;
                }
            }
        }

        Ok(TransitionOutcome {
            artifact_id,
            from_stage: state.current_stage,
            to_stage: stage.id.clone(),
            changed: true,
            version: committed.version,
            dependent,
        })
    }

    async fn load_artifact(&self, artifact_id: Uuid) -> DomainResult<Artifact> {
        self.artifacts
            .get(artifact_id)
            .await?
            .ok_or(DomainError::ArtifactNotFound(artifact_id))
    }

    /// Load the artifact's state, creating it at the initial stage when
    /// missing. The flag is `true` when this call created it.
    async fn ensure_state(&self, artifact: &Artifact, actor: &str) -> DomainResult<(WorkflowState, bool)> {
        if let Some(state) = self.workflows.get_state(artifact.id).await? {
            return Ok((state, false));
        }

        let definition = self.registry.definition(artifact.kind)?;
        let initial = definition
            .initial_stage()
            .ok_or_else(|| DomainError::Configuration(format!("{} workflow has no stages", artifact.kind)))?;

        let now = Utc::now();
        let state = WorkflowState {
            artifact_id: artifact.id,
            kind: artifact.kind,
            current_stage: initial.id.clone(),
            version: 1,
            flag: StageFlag::Active,
            entered_at: now,
            updated_at: now,
        };
        let record = StageTransitionRecord::transition(artifact.id, None, &initial.id, actor, None).at(now);

        if self.workflows.initialize(&state, &record).await? {
            tracing::info!(
                artifact_id = %artifact.id,
                kind = %artifact.kind,
                stage = %initial.id,
                "workflow initialized"
            );
            return Ok((state, true));
        }

        // Another process initialized it between the read and the insert
        let state = self
            .workflows
            .get_state(artifact.id)
            .await?
            .ok_or(DomainError::ArtifactNotFound(artifact.id))?;
        Ok((state, false))
    }

    /// Best-effort side effects of entering `stage`.
    async fn enter_stage(&self, artifact: &Artifact, stage: &WorkflowStage, entered_at: DateTime<Utc>) {
        if let Err(e) = self.reminders.cancel_locked(artifact.id).await {
            tracing::warn!(artifact_id = %artifact.id, stage = %stage.id, error = %e, "failed to cancel reminders");
        }

        if let Some(deadline) = &stage.deadline {
            let due_at = artifact
                .fields
                .due_date_for(&stage.id)
                .unwrap_or_else(|| entered_at + Duration::days(deadline.due_in_days));
            if let Err(e) = self.reminders.schedule_locked(artifact.id, &stage.id, due_at, None).await {
                tracing::warn!(artifact_id = %artifact.id, stage = %stage.id, error = %e, "failed to schedule reminders");
            }
        }

        self.sync_store(artifact, &stage.id).await;
    }

    /// Mirror the stage onto the artifact and push the matching store status.
    async fn sync_store(&self, artifact: &Artifact, stage_id: &str) {
        if let Err(e) = self
            .artifacts
            .update_field(artifact.id, field::WORKFLOW_STAGE, serde_json::Value::from(stage_id))
            .await
        {
            self.counters.sync_failed();
            tracing::warn!(artifact_id = %artifact.id, stage = %stage_id, error = %e, "failed to mirror workflow stage");
        }

        let Some(status) = self.registry.status_for_stage(artifact.kind, stage_id) else {
            return;
        };
        if status == artifact.status {
            return;
        }
        if let Err(e) = self.artifacts.set_status(artifact.id, status).await {
            self.counters.sync_failed();
            tracing::warn!(
                artifact_id = %artifact.id,
                stage = %stage_id,
                status = %status,
                error = %e,
                "failed to sync store status"
            );
        }
    }

    /// Create the dependent artifact for a trigger stage, or reuse the linked
    /// one while it is still open.
    async fn ensure_dependent(
        &self,
        parent: &Artifact,
        spec: &DependentSpec,
        actor: &str,
        events: &mut Vec<WorkflowEvent>,
    ) -> DomainResult<Uuid> {
        if let Some(existing) = parent.fields.linked(&spec.link_field) {
            if let Some(state) = self.workflows.get_state(existing).await? {
                if !self.registry.definition(state.kind)?.is_terminal(&state.current_stage) {
                    tracing::info!(
                        artifact_id = %parent.id,
                        dependent_id = %existing,
                        "reusing open dependent artifact"
                    );
                    return Ok(existing);
                }
            }
        }

        let fields = ArtifactFields {
            parent_id: Some(parent.id),
            ..Default::default()
        };
        let mut dependent =
            Artifact::new(spec.kind, format!("{}: {}", spec.kind.label(), parent.title)).with_fields(fields);
        if let Some(owner) = &parent.owner {
            dependent = dependent.with_owner(owner.clone());
        }

        let dependent_id = self.artifacts.create(&dependent).await?;
        dependent.id = dependent_id;
        let (state, created) = self.ensure_state(&dependent, actor).await?;
        if created {
            if let Some(initial) = self.registry.stage(spec.kind, &state.current_stage) {
                self.enter_stage(&dependent, initial, state.entered_at).await;
            }
        }
        self.artifacts
            .update_field(parent.id, &spec.link_field, serde_json::Value::from(dependent_id.to_string()))
            .await?;

        tracing::info!(
            artifact_id = %parent.id,
            dependent_id = %dependent_id,
            dependent_kind = %spec.kind,
            link_field = %spec.link_field,
            "dependent artifact created"
        );

        if created {
            events.push(stage_changed(&dependent, None, &state.current_stage, actor, None));
        }
        events.push(WorkflowEvent::DependentCreated {
            parent_id: parent.id,
            parent_title: parent.title.clone(),
            dependent_id,
            dependent_kind: spec.kind,
            actor: actor.to_string(),
        });
        Ok(dependent_id)
    }

    /// Append an error record to the current stage. Returns the state after
    /// the append, or the given one when the append itself failed.
    async fn record_error(&self, state: WorkflowState, actor: &str, message: String) -> WorkflowState {
        let now = Utc::now();
        let next = WorkflowState {
            updated_at: now,
            ..state.clone()
        };
        let record =
            StageTransitionRecord::flag(state.artifact_id, &state.current_stage, actor, HistoryEvent::Error, Some(message))
                .at(now);
        match self.workflows.commit(state.version, &next, &record).await {
            Ok(committed) => committed,
            Err(e) => {
                tracing::error!(artifact_id = %state.artifact_id, error = %e, "failed to record error in history");
                state
            }
        }
    }
}

fn stage_changed(
    artifact: &Artifact,
    old_stage: Option<&str>,
    new_stage: &str,
    actor: &str,
    comment: Option<String>,
) -> WorkflowEvent {
    WorkflowEvent::StageChanged {
        artifact_id: artifact.id,
        kind: artifact.kind,
        title: artifact.title.clone(),
        old_stage: old_stage.map(str::to_string),
        new_stage: new_stage.to_string(),
        actor: actor.to_string(),
        comment,
    }
}
