//! Workflow CLI commands: transitions, the blocked flag, progress and history.

use anyhow::{Context, Result};
use clap::Args;
use uuid::Uuid;

use crate::cli::commands::parse_kind;
use crate::cli::output::{
    action_success, completion_bar, list_table, output, render_list, style_status, truncate, CommandOutput,
};
use crate::cli::{log_counters, open_runtime};
use crate::domain::models::{
    ArtifactKind, StageProgressStatus, StageTransitionRecord, WorkflowMetrics, WorkflowProgress, WorkflowStage,
    WorkflowState,
};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{StageRegistry, TransitionOutcome};

#[derive(Args, Debug)]
pub struct TransitionArgs {
    /// Artifact ID
    pub id: Uuid,

    /// Target stage id
    pub stage: String,

    /// Acting user recorded in history
    #[arg(short, long, default_value = "cli")]
    pub actor: String,

    /// Comment recorded in history
    #[arg(short, long)]
    pub comment: Option<String>,

    /// Reject the transition unless the workflow is at this version
    #[arg(long)]
    pub expect_version: Option<u64>,
}

#[derive(Args, Debug)]
pub struct BlockArgs {
    /// Artifact ID
    pub id: Uuid,

    /// Reason recorded in history
    #[arg(short, long)]
    pub reason: Option<String>,

    /// Acting user recorded in history
    #[arg(short, long, default_value = "cli")]
    pub actor: String,
}

#[derive(Args, Debug)]
pub struct ArtifactRef {
    /// Artifact ID
    pub id: Uuid,
}

#[derive(Args, Debug)]
pub struct StagesArgs {
    /// Artifact kind: collection, pta, pia or document
    #[arg(value_parser = parse_kind)]
    pub kind: ArtifactKind,
}

#[derive(Debug, serde::Serialize)]
pub struct TransitionOutput {
    pub artifact_id: Uuid,
    pub from_stage: Option<String>,
    pub to_stage: Option<String>,
    pub changed: bool,
    pub version: Option<u64>,
    pub dependent: Option<Uuid>,
}

impl From<TransitionOutcome> for TransitionOutput {
    fn from(outcome: TransitionOutcome) -> Self {
        Self {
            artifact_id: outcome.artifact_id,
            from_stage: Some(outcome.from_stage),
            to_stage: Some(outcome.to_stage),
            changed: outcome.changed,
            version: Some(outcome.version),
            dependent: outcome.dependent,
        }
    }
}

impl TransitionOutput {
    /// No stage change happened; report where the artifact is.
    pub fn unchanged(artifact_id: Uuid, state: Option<&WorkflowState>) -> Self {
        Self {
            artifact_id,
            from_stage: state.map(|s| s.current_stage.clone()),
            to_stage: state.map(|s| s.current_stage.clone()),
            changed: false,
            version: state.map(|s| s.version),
            dependent: None,
        }
    }
}

impl CommandOutput for TransitionOutput {
    fn to_human(&self) -> String {
        let stage = |s: &Option<String>| s.clone().unwrap_or_else(|| "-".to_string());
        if !self.changed {
            return format!("No stage change; artifact {} is at {}", self.artifact_id, stage(&self.to_stage));
        }
        let mut line = action_success(&format!(
            "{}: {} -> {}",
            self.artifact_id,
            stage(&self.from_stage),
            stage(&self.to_stage)
        ));
        if let Some(dependent) = self.dependent {
            line.push_str(&format!("\n  dependent artifact: {dependent}"));
        }
        line
    }
}

#[derive(Debug, serde::Serialize)]
pub struct BlockOutput {
    pub state: WorkflowState,
}

impl CommandOutput for BlockOutput {
    fn to_human(&self) -> String {
        format!(
            "Artifact {} at {} is {}",
            self.state.artifact_id,
            self.state.current_stage,
            style_status(self.state.flag.as_str())
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ProgressOutput {
    #[serde(flatten)]
    pub progress: WorkflowProgress,
    #[serde(skip)]
    pub stages: Vec<(String, String)>,
}

impl CommandOutput for ProgressOutput {
    fn to_human(&self) -> String {
        let p = &self.progress;
        let mut lines = vec![
            format!("Artifact: {}", p.artifact_id),
            format!("Progress: {}", completion_bar(p.completion_percentage)),
            format!(
                "Current stage: {}{}",
                p.current_stage,
                if p.is_blocked { " (blocked)" } else { "" }
            ),
            String::new(),
        ];

        let mut table = list_table(&["stage", "title", "status"]);
        for (id, title) in &self.stages {
            let status = p
                .stage_status
                .get(id)
                .copied()
                .unwrap_or(StageProgressStatus::NotStarted);
            table.add_row(vec![id.clone(), title.clone(), style_status(status.as_str())]);
        }
        lines.push(table.to_string());
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct MetricsOutput {
    #[serde(flatten)]
    pub metrics: WorkflowMetrics,
}

impl CommandOutput for MetricsOutput {
    fn to_human(&self) -> String {
        let m = &self.metrics;
        [
            format!("Artifact: {}", m.artifact_id),
            format!("Days in workflow: {}", m.days_in_workflow),
            format!("Days in current stage: {}", m.days_in_current_stage),
            format!("Average stage duration: {:.1} days", m.average_stage_duration),
            format!("Completion rate: {:.4} per day", m.completion_rate),
            format!("Blocking incidents: {}", m.blocking_incident_count),
        ]
        .join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HistoryOutput {
    pub artifact_id: Uuid,
    pub records: Vec<StageTransitionRecord>,
    pub total: usize,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "when", "event", "from", "to", "actor", "comment"]);
        for r in &self.records {
            table.add_row(vec![
                r.sequence.to_string(),
                r.timestamp.format("%Y-%m-%d %H:%M").to_string(),
                style_status(r.event.as_str()),
                r.from_stage.clone().unwrap_or_else(|| "-".to_string()),
                r.to_stage.clone(),
                r.actor.clone(),
                truncate(r.comment.as_deref().unwrap_or(""), 40),
            ]);
        }
        render_list("history record", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StagesOutput {
    pub kind: ArtifactKind,
    pub terminal_stage: String,
    pub stages: Vec<WorkflowStage>,
}

impl CommandOutput for StagesOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "stage", "title", "weight", "due", "notifies", "creates"]);
        for stage in &self.stages {
            let due = stage.deadline.as_ref().map_or_else(
                || "-".to_string(),
                |d| match &d.on_overdue {
                    Some(next) => format!("{}d -> {next}", d.due_in_days),
                    None => format!("{}d", d.due_in_days),
                },
            );
            let notifies = stage
                .notifications
                .iter()
                .map(|n| n.template_id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![
                stage.position.to_string(),
                stage.id.clone(),
                stage.title.clone(),
                stage.weight.to_string(),
                due,
                if notifies.is_empty() { "-".to_string() } else { notifies },
                stage
                    .dependent
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |d| d.kind.as_str().to_string()),
            ]);
        }
        format!(
            "{} workflow (terminal: {})\n{table}",
            self.kind.label(),
            self.terminal_stage
        )
    }
}

pub async fn execute_transition(args: TransitionArgs, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;
    let outcome = match args.expect_version {
        Some(version) => {
            runtime
                .transition_if_version(args.id, version, &args.stage, &args.actor, args.comment)
                .await?
        }
        None => runtime.transition(args.id, &args.stage, &args.actor, args.comment).await?,
    };
    output(&TransitionOutput::from(outcome), json_mode);
    log_counters(&runtime);
    Ok(())
}

pub async fn execute_block(args: BlockArgs, blocked: bool, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;
    let state = runtime.set_blocked(args.id, blocked, &args.actor, args.reason).await?;
    output(&BlockOutput { state }, json_mode);
    log_counters(&runtime);
    Ok(())
}

pub async fn execute_progress(args: ArtifactRef, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;
    let progress = runtime.progress(args.id).await?;
    let kind = runtime.artifact(args.id).await?.kind;
    let stages = runtime
        .stages(kind)
        .iter()
        .map(|s| (s.id.clone(), s.title.clone()))
        .collect();
    output(&ProgressOutput { progress, stages }, json_mode);
    Ok(())
}

pub async fn execute_metrics(args: ArtifactRef, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;
    let metrics = runtime.metrics(args.id).await?;
    output(&MetricsOutput { metrics }, json_mode);
    Ok(())
}

pub async fn execute_history(args: ArtifactRef, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;
    let records = runtime.history(args.id).await?;
    let out = HistoryOutput {
        artifact_id: args.id,
        total: records.len(),
        records,
    };
    output(&out, json_mode);
    Ok(())
}

/// Stage definitions come from configuration alone; no database is opened.
pub fn execute_stages(args: &StagesArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let registry = StageRegistry::builtin(&config.workflow).context("Failed to build stage registry")?;
    let definition = registry.definition(args.kind)?;
    let out = StagesOutput {
        kind: args.kind,
        terminal_stage: definition.terminal_stage.clone(),
        stages: definition.stages.clone(),
    };
    output(&out, json_mode);
    Ok(())
}
