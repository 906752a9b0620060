//! Workflow stage definitions and stage history.
//!
//! A [`WorkflowDefinition`] is the ordered stage chain of one artifact kind.
//! Each artifact's position in that chain is a [`WorkflowState`], and every
//! change to it is logged as an append-only [`StageTransitionRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::{ArtifactKind, NotificationCategory};

/// Who receives a stage-entry notification, resolved against the artifact
/// at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RecipientRule {
    /// Every identity holding one of these roles.
    Roles(Vec<String>),
    /// The artifact owner.
    Owner,
    /// Artifact stakeholders subscribed to the category.
    Stakeholders(NotificationCategory),
}

/// A notification fired when a stage is entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageNotification {
    pub template_id: String,
    pub recipients: RecipientRule,
}

impl StageNotification {
    pub fn new(template_id: impl Into<String>, recipients: RecipientRule) -> Self {
        Self {
            template_id: template_id.into(),
            recipients,
        }
    }
}

/// Default deadline attached to a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDeadline {
    /// Days after entry when the stage is due, unless the artifact carries
    /// an explicit due date for it.
    pub due_in_days: i64,
    /// Stage entered automatically when the first overdue reminder fires.
    #[serde(default)]
    pub on_overdue: Option<String>,
}

/// Dependent artifact created when a trigger stage is entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentSpec {
    pub kind: ArtifactKind,
    /// Field on the parent that references the dependent.
    pub link_field: String,
}

/// A named step in a kind-specific workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStage {
    pub id: String,
    pub title: String,
    /// Share of the completion percentage, counted once the stage is exited.
    pub weight: u32,
    /// Display position, zero-based.
    pub position: usize,
    #[serde(default)]
    pub notifications: Vec<StageNotification>,
    #[serde(default)]
    pub deadline: Option<StageDeadline>,
    #[serde(default)]
    pub dependent: Option<DependentSpec>,
}

impl WorkflowStage {
    pub fn new(id: impl Into<String>, title: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            weight,
            position: 0,
            notifications: Vec::new(),
            deadline: None,
            dependent: None,
        }
    }

    pub fn notify(mut self, template_id: &str, recipients: RecipientRule) -> Self {
        self.notifications.push(StageNotification::new(template_id, recipients));
        self
    }

    pub fn due_in(mut self, days: i64, on_overdue: Option<&str>) -> Self {
        self.deadline = Some(StageDeadline {
            due_in_days: days,
            on_overdue: on_overdue.map(str::to_string),
        });
        self
    }

    pub fn spawns(mut self, kind: ArtifactKind, link_field: &str) -> Self {
        self.dependent = Some(DependentSpec {
            kind,
            link_field: link_field.to_string(),
        });
        self
    }
}

/// The full stage chain for one artifact kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub kind: ArtifactKind,
    pub stages: Vec<WorkflowStage>,
    /// Content-store status to stage id pairs. Each status and each stage
    /// appears at most once.
    pub status_map: Vec<(String, String)>,
    /// Stage with no outgoing transitions.
    pub terminal_stage: String,
}

impl WorkflowDefinition {
    pub fn initial_stage(&self) -> Option<&WorkflowStage> {
        self.stages.first()
    }

    pub fn stage(&self, id: &str) -> Option<&WorkflowStage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.stage(id).is_some()
    }

    pub fn is_terminal(&self, id: &str) -> bool {
        self.terminal_stage == id
    }

    pub fn total_weight(&self) -> u32 {
        self.stages.iter().map(|s| s.weight).sum()
    }
}

/// Explicitly recorded stage-status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFlag {
    #[default]
    Active,
    Blocked,
}

impl StageFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

/// Persisted workflow position of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub artifact_id: Uuid,
    pub kind: ArtifactKind,
    pub current_stage: String,
    /// Incremented on every committed change; used for compare-and-swap.
    pub version: u64,
    pub flag: StageFlag,
    pub entered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn is_blocked(&self) -> bool {
        self.flag == StageFlag::Blocked
    }
}

/// What a history record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEvent {
    /// A stage change.
    #[default]
    Transition,
    /// The current stage was flagged blocked.
    Blocked,
    /// The blocked flag was cleared.
    Unblocked,
    /// A side effect of the current stage failed.
    Error,
}

impl HistoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transition => "transition",
            Self::Blocked => "blocked",
            Self::Unblocked => "unblocked",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transition" => Some(Self::Transition),
            "blocked" => Some(Self::Blocked),
            "unblocked" => Some(Self::Unblocked),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether the record counts as a blocking incident.
    pub fn is_incident(&self) -> bool {
        matches!(self, Self::Blocked | Self::Error)
    }
}

/// Immutable history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransitionRecord {
    pub artifact_id: Uuid,
    /// Position in the artifact's history, equal to the workflow version
    /// the record committed.
    pub sequence: u64,
    pub from_stage: Option<String>,
    pub to_stage: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
    #[serde(default)]
    pub event: HistoryEvent,
}

impl StageTransitionRecord {
    pub fn transition(
        artifact_id: Uuid,
        from_stage: Option<&str>,
        to_stage: &str,
        actor: &str,
        comment: Option<String>,
    ) -> Self {
        Self {
            artifact_id,
            sequence: 0,
            from_stage: from_stage.map(str::to_string),
            to_stage: to_stage.to_string(),
            actor: actor.to_string(),
            timestamp: Utc::now(),
            comment,
            event: HistoryEvent::Transition,
        }
    }

    /// A flag record on the current stage (blocked/unblocked/error).
    pub fn flag(artifact_id: Uuid, stage: &str, actor: &str, event: HistoryEvent, comment: Option<String>) -> Self {
        Self {
            artifact_id,
            sequence: 0,
            from_stage: Some(stage.to_string()),
            to_stage: stage.to_string(),
            actor: actor.to_string(),
            timestamp: Utc::now(),
            comment,
            event,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_transition(&self) -> bool {
        self.event == HistoryEvent::Transition
    }
}
