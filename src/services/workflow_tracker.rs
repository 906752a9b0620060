//! Workflow progress and metrics.
//!
//! Everything here is derived from the stage history and the current state;
//! nothing is stored. Only `transition` records count towards completion and
//! durations. Blocked and error records count as blocking incidents.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::progress::round1;
use crate::domain::models::{
    StageProgressStatus, StageTransitionRecord, TimelineEntry, WorkflowDefinition, WorkflowMetrics,
    WorkflowProgress, WorkflowState,
};
use crate::domain::ports::WorkflowRepository;
use crate::services::stage_registry::StageRegistry;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Stages completed so far, in order of first completion.
///
/// A stage is completed once a later transition leaves it, so the stage the
/// artifact sits in, terminal included, never counts.
pub fn completed_stages(history: &[StageTransitionRecord]) -> Vec<String> {
    let mut completed: Vec<String> = Vec::new();
    let mut entered = HashSet::new();

    for record in history.iter().filter(|r| r.is_transition()) {
        if let Some(from) = record.from_stage.as_deref() {
            if entered.contains(from) && !completed.iter().any(|c| c == from) {
                completed.push(from.to_string());
            }
        }
        entered.insert(record.to_stage.as_str());
    }

    completed
}

/// One entry per stage visit.
pub fn timeline(definition: &WorkflowDefinition, history: &[StageTransitionRecord]) -> Vec<TimelineEntry> {
    let transitions: Vec<&StageTransitionRecord> = history.iter().filter(|r| r.is_transition()).collect();

    transitions
        .iter()
        .enumerate()
        .map(|(i, record)| TimelineEntry {
            stage: record.to_stage.clone(),
            title: definition
                .stage(&record.to_stage)
                .map(|s| s.title.clone())
                .unwrap_or_else(|| record.to_stage.clone()),
            entered_at: record.timestamp,
            exited_at: transitions.get(i + 1).map(|next| next.timestamp),
            actor: record.actor.clone(),
        })
        .collect()
}

/// Completion percentage with one decimal.
pub fn completion_percentage(definition: &WorkflowDefinition, completed: &[String]) -> f64 {
    let total = definition.total_weight();
    if total == 0 {
        return 0.0;
    }
    let done: u32 = completed
        .iter()
        .filter_map(|id| definition.stage(id))
        .map(|s| s.weight)
        .sum();
    round1(100.0 * f64::from(done) / f64::from(total))
}

fn started_at(state: &WorkflowState, history: &[StageTransitionRecord]) -> DateTime<Utc> {
    history.first().map(|r| r.timestamp).unwrap_or(state.entered_at)
}

/// Build the progress snapshot of one artifact.
pub fn compute_progress(
    definition: &WorkflowDefinition,
    state: &WorkflowState,
    history: &[StageTransitionRecord],
) -> WorkflowProgress {
    let completed = completed_stages(history);

    let stage_status: BTreeMap<String, StageProgressStatus> = definition
        .stages
        .iter()
        .map(|stage| {
            let status = if stage.id == state.current_stage {
                if state.is_blocked() {
                    StageProgressStatus::Blocked
                } else {
                    StageProgressStatus::InProgress
                }
            } else if completed.contains(&stage.id) {
                StageProgressStatus::Completed
            } else {
                StageProgressStatus::NotStarted
            };
            (stage.id.clone(), status)
        })
        .collect();

    let last_updated_at = history
        .last()
        .map(|r| r.timestamp.max(state.updated_at))
        .unwrap_or(state.updated_at);

    WorkflowProgress {
        artifact_id: state.artifact_id,
        current_stage: state.current_stage.clone(),
        completion_percentage: completion_percentage(definition, &completed),
        completed_stages: completed,
        stage_status,
        started_at: started_at(state, history),
        last_updated_at,
        is_blocked: state.is_blocked(),
        timeline: timeline(definition, history),
    }
}

/// Whole days since the latest entry into `stage`; 0 if never entered.
pub fn days_in_stage(history: &[StageTransitionRecord], stage: &str, now: DateTime<Utc>) -> i64 {
    history
        .iter()
        .filter(|r| r.is_transition() && r.to_stage == stage)
        .map(|r| r.timestamp)
        .max()
        .map(|entered| (now - entered).num_days().max(0))
        .unwrap_or(0)
}

/// Duration and velocity metrics for one artifact.
pub fn compute_metrics(
    definition: &WorkflowDefinition,
    state: &WorkflowState,
    history: &[StageTransitionRecord],
    now: DateTime<Utc>,
) -> WorkflowMetrics {
    let completed = completed_stages(history);
    let days_in_workflow = (now - started_at(state, history)).num_days().max(0);

    // Time spent per stage across every closed visit
    let mut spent: HashMap<String, f64> = HashMap::new();
    for entry in timeline(definition, history) {
        if let Some(exited) = entry.exited_at {
            let days = (exited - entry.entered_at).num_seconds() as f64 / SECONDS_PER_DAY;
            *spent.entry(entry.stage).or_default() += days;
        }
    }
    let durations: Vec<f64> = completed.iter().filter_map(|id| spent.get(id).copied()).collect();
    let average_stage_duration = if durations.is_empty() {
        0.0
    } else {
        round1(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    let total_stages = definition.stages.len();
    let completion_rate = if days_in_workflow == 0 || total_stages == 0 {
        0.0
    } else {
        (completed.len() as f64 / total_stages as f64) / days_in_workflow as f64
    };

    WorkflowMetrics {
        artifact_id: state.artifact_id,
        days_in_workflow,
        days_in_current_stage: days_in_stage(history, &state.current_stage, now),
        average_stage_duration,
        completion_rate,
        blocking_incident_count: history.iter().filter(|r| r.event.is_incident()).count(),
    }
}

/// Reads workflow state and history and derives progress views.
pub struct WorkflowTracker {
    registry: Arc<StageRegistry>,
    workflows: Arc<dyn WorkflowRepository>,
}

impl WorkflowTracker {
    pub fn new(registry: Arc<StageRegistry>, workflows: Arc<dyn WorkflowRepository>) -> Self {
        Self { registry, workflows }
    }

    async fn load(&self, artifact_id: Uuid) -> DomainResult<(WorkflowState, Vec<StageTransitionRecord>)> {
        let state = self
            .workflows
            .get_state(artifact_id)
            .await?
            .ok_or(DomainError::ArtifactNotFound(artifact_id))?;
        let history = self.workflows.history(artifact_id).await?;
        Ok((state, history))
    }

    pub async fn progress(&self, artifact_id: Uuid) -> DomainResult<WorkflowProgress> {
        let (state, history) = self.load(artifact_id).await?;
        let definition = self.registry.definition(state.kind)?;
        Ok(compute_progress(definition, &state, &history))
    }

    pub async fn metrics(&self, artifact_id: Uuid) -> DomainResult<WorkflowMetrics> {
        self.metrics_at(artifact_id, Utc::now()).await
    }

    pub async fn metrics_at(&self, artifact_id: Uuid, now: DateTime<Utc>) -> DomainResult<WorkflowMetrics> {
        let (state, history) = self.load(artifact_id).await?;
        let definition = self.registry.definition(state.kind)?;
        Ok(compute_metrics(definition, &state, &history, now))
    }

    pub async fn history(&self, artifact_id: Uuid) -> DomainResult<Vec<StageTransitionRecord>> {
        self.load(artifact_id).await.map(|(_, history)| history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ArtifactKind, HistoryEvent, StageFlag, WorkflowConfig};
    use chrono::Duration;

    fn collection() -> WorkflowDefinition {
        StageRegistry::builtin(&WorkflowConfig::default())
            .unwrap()
            .definition(ArtifactKind::Collection)
            .unwrap()
            .clone()
    }

    fn state(id: Uuid, stage: &str, at: DateTime<Utc>) -> WorkflowState {
        WorkflowState {
            artifact_id: id,
            kind: ArtifactKind::Collection,
            current_stage: stage.to_string(),
            version: 1,
            flag: StageFlag::Active,
            entered_at: at,
            updated_at: at,
        }
    }

    /// History walking `path` one day apart, starting at `start`.
    fn walk(id: Uuid, path: &[&str], start: DateTime<Utc>) -> Vec<StageTransitionRecord> {
        let mut history = Vec::new();
        let mut previous: Option<&str> = None;
        for (i, stage) in path.iter().enumerate() {
            let mut record = StageTransitionRecord::transition(id, previous, stage, "tester", None)
                .at(start + Duration::days(i as i64));
            record.sequence = i as u64 + 1;
            history.push(record);
            previous = Some(*stage);
        }
        history
    }

    #[test]
    fn test_new_collection_is_zero_percent() {
        let def = collection();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let history = walk(id, &["draft"], now);

        let progress = compute_progress(&def, &state(id, "draft", now), &history);

        assert_eq!(progress.current_stage, "draft");
        assert!(progress.completed_stages.is_empty());
        assert!((progress.completion_percentage - 0.0).abs() < f64::EPSILON);
        assert_eq!(progress.stage_status["draft"], StageProgressStatus::InProgress);
        assert_eq!(progress.stage_status["archived"], StageProgressStatus::InProgress);
    }

    #[test]
    fn test_completion_through_pia_required() {
        let def = collection();
        let id = Uuid::new_v4();
        let start = Utc::now() - Duration::days(10);
        let history = walk(
            id,
            &["draft", "pta_required", "pta_in_progress", "pta_review", "pia_required"],
            start,
        );

        let progress = compute_progress(&def, &state(id, "pia_required", start), &history);

        assert_eq!(
            progress.completed_stages,
            vec!["draft", "pta_required", "pta_in_progress", "pta_review"]
        );
        assert!((progress.completion_percentage - 35.0).abs() < f64::EPSILON);
        assert_eq!(progress.timeline.len(), 5);
        assert!(progress.timeline[4].exited_at.is_none());
    }

    #[test]
    fn test_reentry_keeps_completed_stages() {
        let def = collection();
        let id = Uuid::new_v4();
        let start = Utc::now() - Duration::days(10);
        let history = walk(id, &["draft", "pta_required", "draft"], start);

        let progress = compute_progress(&def, &state(id, "draft", start), &history);

        assert_eq!(progress.completed_stages, vec!["draft", "pta_required"]);
        assert!((progress.completion_percentage - 10.0).abs() < f64::EPSILON);
        assert_eq!(progress.stage_status["draft"], StageProgressStatus::InProgress);
        assert_eq!(progress.stage_status["pta_required"], StageProgressStatus::Completed);
    }

    #[test]
    fn test_blocked_flag_and_incidents() {
        let def = collection();
        let id = Uuid::new_v4();
        let start = Utc::now() - Duration::days(3);
        let mut history = walk(id, &["draft", "pta_required"], start);
        history.push(StageTransitionRecord::flag(id, "pta_required", "system", HistoryEvent::Blocked, None));
        history.push(StageTransitionRecord::flag(id, "pta_required", "olivia", HistoryEvent::Unblocked, None));
        history.push(StageTransitionRecord::flag(id, "pta_required", "system", HistoryEvent::Error, None));

        let mut current = state(id, "pta_required", start);
        current.flag = StageFlag::Blocked;

        let progress = compute_progress(&def, &current, &history);
        assert!(progress.is_blocked);
        assert_eq!(progress.stage_status["pta_required"], StageProgressStatus::Blocked);
        assert_eq!(progress.completed_stages, vec!["draft"]);

        let metrics = compute_metrics(&def, &current, &history, Utc::now());
        assert_eq!(metrics.blocking_incident_count, 2);
    }

    #[test]
    fn test_metrics_durations() {
        let def = collection();
        let id = Uuid::new_v4();
        let start = Utc::now() - Duration::days(4) - Duration::hours(1);
        // Each stage lasts one day
        let history = walk(id, &["draft", "pta_required", "pta_in_progress"], start);

        let metrics = compute_metrics(&def, &state(id, "pta_in_progress", start), &history, Utc::now());

        assert_eq!(metrics.days_in_workflow, 4);
        assert_eq!(metrics.days_in_current_stage, 2);
        assert!((metrics.average_stage_duration - 1.0).abs() < f64::EPSILON);
        let expected_rate = (2.0 / 12.0) / 4.0;
        assert!((metrics.completion_rate - expected_rate).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_first_day_guard() {
        let def = collection();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let history = walk(id, &["draft", "pta_required"], now - Duration::hours(2));

        let metrics = compute_metrics(&def, &state(id, "pta_required", now), &history, now);

        assert_eq!(metrics.days_in_workflow, 0);
        assert!((metrics.completion_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_terminal_stage_is_not_completed_on_entry() {
        let def = collection();
        let id = Uuid::new_v4();
        let start = Utc::now() - Duration::days(2);
        let history = walk(id, &["draft", "archived"], start);

        let progress = compute_progress(&def, &state(id, "archived", start), &history);
        assert_eq!(progress.completed_stages, vec!["draft"]);
        assert_eq!(progress.stage_status["archived"], StageProgressStatus::InProgress);
        assert!((progress.completion_percentage - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_full_collection_walk_stops_short_of_terminal_weight() {
        let def = collection();
        let id = Uuid::new_v4();
        let start = Utc::now() - Duration::days(40);
        let stages: Vec<&str> = def.stages.iter().map(|s| s.id.as_str()).collect();
        let history = walk(id, &stages, start);

        let progress = compute_progress(&def, &state(id, "archived", start), &history);
        assert_eq!(progress.completed_stages.len(), def.stages.len() - 1);
        assert!(!progress.completed_stages.contains(&"archived".to_string()));
        assert!((progress.completion_percentage - 90.0).abs() < f64::EPSILON);
    }
}
