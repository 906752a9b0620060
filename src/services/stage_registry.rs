//! Workflow stage registry.
//!
//! Holds the compiled-in stage chain of every artifact kind together with
//! the store-status mapping. Definitions are validated once at startup; an
//! invalid table is a configuration error.

use std::collections::{BTreeMap, HashSet};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ArtifactKind, NotificationCategory, RecipientRule, WorkflowConfig, WorkflowDefinition, WorkflowStage,
};
use crate::domain::models::field;

/// Roles notified when an assessment is required.
const ASSESSMENT_ROLES: [&str; 2] = ["privacy_officer", "collection_owner"];
const REVIEWER_ROLES: [&str; 1] = ["privacy_officer"];

fn roles(names: &[&str]) -> RecipientRule {
    RecipientRule::Roles(names.iter().map(|r| (*r).to_string()).collect())
}

fn status_map(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(s, t)| ((*s).to_string(), (*t).to_string())).collect()
}

/// The 12-stage collection lifecycle.
pub fn collection_workflow(config: &WorkflowConfig) -> WorkflowDefinition {
    WorkflowDefinition {
        kind: ArtifactKind::Collection,
        stages: vec![
            WorkflowStage::new("draft", "Draft", 5),
            WorkflowStage::new("pta_required", "PTA Required", 5)
                .notify("pta_required", roles(&ASSESSMENT_ROLES))
                .spawns(ArtifactKind::Threshold, field::CURRENT_PTA),
            WorkflowStage::new("pta_in_progress", "PTA In Progress", 15),
            WorkflowStage::new("pta_review", "PTA Review", 10)
                .notify("review_requested", roles(&REVIEWER_ROLES))
                .due_in(14, None),
            WorkflowStage::new("pia_required", "PIA Required", 5)
                .notify("pia_required", roles(&ASSESSMENT_ROLES))
                .spawns(ArtifactKind::Impact, field::CURRENT_PIA),
            WorkflowStage::new("pia_in_progress", "PIA In Progress", 20),
            WorkflowStage::new("pia_review", "PIA Review", 10)
                .notify("review_requested", roles(&REVIEWER_ROLES))
                .due_in(30, None),
            WorkflowStage::new("approved", "Approved", 5)
                .notify("approved", RecipientRule::Owner)
                .notify("approved", RecipientRule::Stakeholders(NotificationCategory::StatusChange)),
            WorkflowStage::new("active", "Active", 5).due_in(config.periodic_review_days, Some("periodic_review")),
            WorkflowStage::new("periodic_review", "Periodic Review", 5)
                .notify("periodic_review_due", roles(&REVIEWER_ROLES))
                .notify("periodic_review_due", RecipientRule::Owner)
                .due_in(30, None),
            WorkflowStage::new("retirement", "Retirement", 5),
            WorkflowStage::new("archived", "Archived", 10),
        ],
        status_map: status_map(&[
            ("draft", "draft"),
            ("pending", "pia_review"),
            ("publish", "active"),
            ("archived", "archived"),
        ]),
        terminal_stage: "archived".to_string(),
    }
}

/// Privacy threshold assessment lifecycle.
pub fn threshold_workflow() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: ArtifactKind::Threshold,
        stages: vec![
            WorkflowStage::new("draft", "Draft", 10),
            WorkflowStage::new("in_progress", "In Progress", 30),
            WorkflowStage::new("review", "Review", 30)
                .notify("review_requested", roles(&REVIEWER_ROLES))
                .due_in(14, None),
            WorkflowStage::new("approved", "Approved", 20).notify("approved", RecipientRule::Owner),
            WorkflowStage::new("archived", "Archived", 10),
        ],
        status_map: status_map(&[
            ("draft", "draft"),
            ("pending", "review"),
            ("publish", "approved"),
            ("archived", "archived"),
        ]),
        terminal_stage: "archived".to_string(),
    }
}

/// Privacy impact assessment lifecycle.
pub fn impact_workflow() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: ArtifactKind::Impact,
        stages: vec![
            WorkflowStage::new("draft", "Draft", 10),
            WorkflowStage::new("in_progress", "In Progress", 35),
            WorkflowStage::new("review", "Review", 25)
                .notify("review_requested", roles(&REVIEWER_ROLES))
                .due_in(30, None),
            WorkflowStage::new("approved", "Approved", 20).notify("approved", RecipientRule::Owner),
            WorkflowStage::new("archived", "Archived", 10),
        ],
        status_map: status_map(&[
            ("draft", "draft"),
            ("pending", "review"),
            ("publish", "approved"),
            ("archived", "archived"),
        ]),
        terminal_stage: "archived".to_string(),
    }
}

/// Generic document lifecycle.
pub fn document_workflow() -> WorkflowDefinition {
    WorkflowDefinition {
        kind: ArtifactKind::Document,
        stages: vec![
            WorkflowStage::new("draft", "Draft", 20),
            WorkflowStage::new("review", "Review", 30)
                .notify("review_requested", RecipientRule::Owner)
                .due_in(14, None),
            WorkflowStage::new("published", "Published", 40),
            WorkflowStage::new("archived", "Archived", 10),
        ],
        status_map: status_map(&[
            ("draft", "draft"),
            ("pending", "review"),
            ("publish", "published"),
            ("archived", "archived"),
        ]),
        terminal_stage: "archived".to_string(),
    }
}

/// Per-kind stage tables.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    definitions: BTreeMap<ArtifactKind, WorkflowDefinition>,
}

impl StageRegistry {
    /// The compiled-in tables for every kind.
    pub fn builtin(config: &WorkflowConfig) -> DomainResult<Self> {
        Self::new(vec![
            collection_workflow(config),
            threshold_workflow(),
            impact_workflow(),
            document_workflow(),
        ])
    }

    /// Validate and index definitions. Stage positions are assigned from
    /// list order.
    pub fn new(definitions: Vec<WorkflowDefinition>) -> DomainResult<Self> {
        let mut indexed = BTreeMap::new();
        for mut definition in definitions {
            for (position, stage) in definition.stages.iter_mut().enumerate() {
                stage.position = position;
            }
            validate_definition(&definition)?;
            if indexed.insert(definition.kind, definition).is_some() {
                return Err(DomainError::Configuration("duplicate workflow definition".to_string()));
            }
        }

        for kind in ArtifactKind::ALL {
            if !indexed.contains_key(&kind) {
                return Err(DomainError::Configuration(format!("no workflow defined for kind '{kind}'")));
            }
        }

        Ok(Self { definitions: indexed })
    }

    pub fn definition(&self, kind: ArtifactKind) -> DomainResult<&WorkflowDefinition> {
        self.definitions
            .get(&kind)
            .ok_or_else(|| DomainError::UnknownKind(kind.to_string()))
    }

    /// Ordered stages of a kind.
    pub fn stages_for(&self, kind: ArtifactKind) -> &[WorkflowStage] {
        self.definitions.get(&kind).map(|d| d.stages.as_slice()).unwrap_or(&[])
    }

    pub fn stage(&self, kind: ArtifactKind, stage_id: &str) -> Option<&WorkflowStage> {
        self.definitions.get(&kind).and_then(|d| d.stage(stage_id))
    }

    /// Stage a store status maps to. `None` means the status carries no
    /// workflow meaning and must not cause a transition.
    pub fn stage_for_status(&self, kind: ArtifactKind, status: &str) -> Option<&str> {
        self.definitions.get(&kind).and_then(|d| {
            d.status_map
                .iter()
                .find(|(s, _)| s == status)
                .map(|(_, stage)| stage.as_str())
        })
    }

    /// Store status that represents a stage, if any.
    pub fn status_for_stage(&self, kind: ArtifactKind, stage_id: &str) -> Option<&str> {
        self.definitions.get(&kind).and_then(|d| {
            d.status_map
                .iter()
                .find(|(_, stage)| stage == stage_id)
                .map(|(status, _)| status.as_str())
        })
    }

    /// Every template id referenced by a stage notification.
    pub fn referenced_templates(&self) -> HashSet<&str> {
        self.definitions
            .values()
            .flat_map(|d| d.stages.iter())
            .flat_map(|s| s.notifications.iter())
            .map(|n| n.template_id.as_str())
            .collect()
    }
}

fn validate_definition(definition: &WorkflowDefinition) -> DomainResult<()> {
    let kind = definition.kind;
    let fail = |msg: String| Err(DomainError::Configuration(format!("{kind} workflow: {msg}")));

    if definition.stages.is_empty() {
        return fail("must have at least one stage".to_string());
    }

    let mut seen = HashSet::new();
    for stage in &definition.stages {
        if stage.id.is_empty() {
            return fail("stage with empty id".to_string());
        }
        if !seen.insert(stage.id.as_str()) {
            return fail(format!("duplicate stage id '{}'", stage.id));
        }
        if stage.weight == 0 {
            return fail(format!("stage '{}' must have a positive weight", stage.id));
        }
    }

    if !definition.contains(&definition.terminal_stage) {
        return fail(format!("terminal stage '{}' is not defined", definition.terminal_stage));
    }

    for stage in &definition.stages {
        if let Some(deadline) = &stage.deadline {
            if deadline.due_in_days <= 0 {
                return fail(format!("stage '{}' deadline must be positive", stage.id));
            }
            if let Some(target) = &deadline.on_overdue {
                if !definition.contains(target) {
                    return fail(format!("stage '{}' escalates to unknown stage '{target}'", stage.id));
                }
            }
        }
        if let Some(dependent) = &stage.dependent {
            if dependent.kind == kind {
                return fail(format!("stage '{}' cannot spawn its own kind", stage.id));
            }
        }
    }

    let mut statuses = HashSet::new();
    let mut targets = HashSet::new();
    for (status, target) in &definition.status_map {
        if !definition.contains(target) {
            return fail(format!("status '{status}' maps to unknown stage '{target}'"));
        }
        if !statuses.insert(status.as_str()) {
            return fail(format!("status '{status}' is mapped twice"));
        }
        if !targets.insert(target.as_str()) {
            return fail(format!("stage '{target}' is the target of more than one status"));
        }
    }

    Ok(())
}
