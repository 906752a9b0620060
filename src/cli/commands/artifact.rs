//! Artifact CLI commands.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Subcommand};
use serde_json::Value;
use uuid::Uuid;

use crate::cli::commands::parse_kind;
use crate::cli::commands::workflow::TransitionOutput;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::{log_counters, open_runtime};
use crate::domain::models::{field, Artifact, ArtifactFields, ArtifactKind, WorkflowState};

#[derive(Args, Debug)]
pub struct ArtifactArgs {
    #[command(subcommand)]
    pub command: ArtifactCommands,
}

#[derive(Subcommand, Debug)]
pub enum ArtifactCommands {
    /// Create an artifact and start its workflow
    Create {
        /// Artifact kind: collection, pta, pia or document
        #[arg(value_parser = parse_kind)]
        kind: ArtifactKind,

        /// Artifact title
        title: String,

        /// Owning user id
        #[arg(short, long)]
        owner: Option<String>,

        /// Field to set, as key=value (value parsed as JSON when possible)
        #[arg(short, long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// Stage due date, as stage=YYYY-MM-DD
        #[arg(short, long = "due", value_name = "STAGE=DATE")]
        due: Vec<String>,

        /// Acting user recorded in history
        #[arg(short, long, default_value = "cli")]
        actor: String,
    },
    /// Set the store status of an artifact
    Status {
        /// Artifact ID
        id: Uuid,

        /// New status
        status: String,
    },
    /// Show artifact details and workflow state
    Show {
        /// Artifact ID
        id: Uuid,
    },
    /// List artifacts
    List {
        /// Only list artifacts of this kind
        #[arg(short, long, value_parser = parse_kind)]
        kind: Option<ArtifactKind>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub kind: String,
    pub title: String,
    pub status: String,
    pub owner: Option<String>,
    pub stage: Option<String>,
}

impl From<&Artifact> for ArtifactSummary {
    fn from(artifact: &Artifact) -> Self {
        Self {
            id: artifact.id,
            kind: artifact.kind.as_str().to_string(),
            title: artifact.title.clone(),
            status: artifact.status.clone(),
            owner: artifact.owner.clone(),
            stage: artifact.fields.workflow_stage.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ArtifactListOutput {
    pub artifacts: Vec<ArtifactSummary>,
    pub total: usize,
}

impl CommandOutput for ArtifactListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "kind", "title", "status", "stage", "owner"]);
        for a in &self.artifacts {
            table.add_row(vec![
                short_id(&a.id),
                a.kind.clone(),
                truncate(&a.title, 40),
                a.status.clone(),
                a.stage.clone().unwrap_or_else(|| "-".to_string()),
                a.owner.clone().unwrap_or_else(|| "-".to_string()),
            ]);
        }
        render_list("artifact", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ArtifactDetailOutput {
    pub artifact: Artifact,
    pub state: Option<WorkflowState>,
}

impl CommandOutput for ArtifactDetailOutput {
    fn to_human(&self) -> String {
        let a = &self.artifact;
        let mut lines = vec![
            format!("Artifact: {}", a.title),
            format!("ID: {}", a.id),
            format!("Kind: {}", a.kind.label()),
            format!("Status: {}", a.status),
            format!("Owner: {}", a.owner.as_deref().unwrap_or("-")),
            format!("Created: {}", a.created_at.to_rfc3339()),
        ];

        match &self.state {
            Some(state) => {
                lines.push(format!(
                    "Stage: {} (version {}, {})",
                    state.current_stage,
                    state.version,
                    state.flag.as_str()
                ));
                lines.push(format!("Entered: {}", state.entered_at.to_rfc3339()));
            }
            None => lines.push("Stage: not started".to_string()),
        }

        for (label, key) in [
            ("PTA", field::CURRENT_PTA),
            ("PIA", field::CURRENT_PIA),
            ("Parent", field::PARENT_ID),
        ] {
            if let Some(linked) = a.fields.linked(key) {
                lines.push(format!("{label}: {linked}"));
            }
        }

        if !a.fields.due_dates.is_empty() {
            lines.push("\nDue dates:".to_string());
            for (stage, due) in &a.fields.due_dates {
                lines.push(format!("  {stage}: {}", due.format("%Y-%m-%d")));
            }
        }
        if !a.fields.stakeholders.is_empty() {
            lines.push("\nStakeholders:".to_string());
            for s in &a.fields.stakeholders {
                lines.push(format!("  {} <{}> ({})", s.name, s.email, s.role));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CreateOutput {
    pub artifact: ArtifactSummary,
    pub stage: String,
    pub version: u64,
}

impl CommandOutput for CreateOutput {
    fn to_human(&self) -> String {
        crate::cli::output::action_success(&format!(
            "Created {} {} '{}' at stage {}",
            self.artifact.kind, self.artifact.id, self.artifact.title, self.stage
        ))
    }
}

/// Build a field map from `key=value` and `stage=date` arguments.
pub fn build_fields(pairs: &[String], due: &[String]) -> Result<ArtifactFields> {
    let mut fields = ArtifactFields::default();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("Invalid field '{pair}', expected KEY=VALUE"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.set(key.trim(), value)?;
    }
    for entry in due {
        let (stage, date) = entry
            .split_once('=')
            .with_context(|| format!("Invalid due date '{entry}', expected STAGE=YYYY-MM-DD"))?;
        let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{date}', expected YYYY-MM-DD"))?;
        fields
            .due_dates
            .insert(stage.trim().to_string(), date.and_time(NaiveTime::MIN).and_utc());
    }
    Ok(fields)
}

pub async fn execute(args: ArtifactArgs, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;

    match args.command {
        ArtifactCommands::Create {
            kind,
            title,
            owner,
            fields,
            due,
            actor,
        } => {
            let fields = build_fields(&fields, &due)?;
            let (artifact, state) = runtime
                .create_artifact(kind, &title, owner.as_deref(), fields, &actor)
                .await?;
            let out = CreateOutput {
                artifact: ArtifactSummary::from(&artifact),
                stage: state.current_stage,
                version: state.version,
            };
            output(&out, json_mode);
        }

        ArtifactCommands::Status { id, status } => {
            let outcome = runtime.set_status(id, &status).await?;
            let out = match outcome {
                Some(outcome) => TransitionOutput::from(outcome),
                None => {
                    let state = runtime.state(id).await?;
                    TransitionOutput::unchanged(id, state.as_ref())
                }
            };
            output(&out, json_mode);
        }

        ArtifactCommands::Show { id } => {
            let out = ArtifactDetailOutput {
                artifact: runtime.artifact(id).await?,
                state: runtime.state(id).await?,
            };
            output(&out, json_mode);
        }

        ArtifactCommands::List { kind } => {
            let artifacts = runtime.artifacts(kind).await?;
            let out = ArtifactListOutput {
                total: artifacts.len(),
                artifacts: artifacts.iter().map(ArtifactSummary::from).collect(),
            };
            output(&out, json_mode);
        }
    }

    log_counters(&runtime);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fields() {
        let pta = Uuid::new_v4();
        let fields = build_fields(
            &[format!("current_pta=\"{pta}\""), "department=Finance".to_string(), "retention=7".to_string()],
            &["pia_review=2026-03-01".to_string()],
        )
        .unwrap();

        assert_eq!(fields.current_pta, Some(pta));
        assert_eq!(fields.extra["department"], Value::String("Finance".to_string()));
        assert_eq!(fields.extra["retention"], serde_json::json!(7));
        assert_eq!(
            fields.due_date_for("pia_review").unwrap().format("%Y-%m-%d").to_string(),
            "2026-03-01"
        );
    }

    #[test]
    fn test_build_fields_rejects_malformed_input() {
        assert!(build_fields(&["no_separator".to_string()], &[]).is_err());
        assert!(build_fields(&[], &["review=tomorrow".to_string()]).is_err());
        assert!(build_fields(&["current_pta=not-a-uuid".to_string()], &[]).is_err());
    }

    #[test]
    fn test_list_output_empty() {
        let out = ArtifactListOutput {
            artifacts: vec![],
            total: 0,
        };
        assert_eq!(out.to_human(), "No artifacts found.");
    }

    #[test]
    fn test_list_rows_use_short_ids() {
        let artifact = Artifact::new(ArtifactKind::Impact, "Payroll PIA");
        let summary = ArtifactSummary::from(&artifact);
        assert_eq!(summary.id, artifact.id);
        assert_eq!(summary.kind, "impact");

        let out = ArtifactListOutput {
            artifacts: vec![summary],
            total: 1,
        };
        let human = out.to_human();
        assert!(human.contains(&short_id(&artifact.id)));
        assert!(!human.contains(&artifact.id.to_string()));
    }
}
