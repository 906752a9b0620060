//! Reminder CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::application::TickReport;
use crate::cli::output::{list_table, output, render_list, style_status, CommandOutput};
use crate::cli::{log_counters, open_runtime};
use crate::domain::models::ScheduledReminder;

#[derive(Args, Debug)]
pub struct RemindersArgs {
    #[command(subcommand)]
    pub command: ReminderCommands,
}

#[derive(Subcommand, Debug)]
pub enum ReminderCommands {
    /// Deliver reminders that are due now, once
    Tick,
    /// Deliver reminders periodically until interrupted
    Run,
    /// List the reminders scheduled for an artifact
    List {
        /// Artifact ID
        id: Uuid,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct TickOutput {
    #[serde(flatten)]
    pub report: TickReport,
}

impl CommandOutput for TickOutput {
    fn to_human(&self) -> String {
        if self.report.is_empty() {
            return "No reminders due.".to_string();
        }
        let mut lines = vec![format!("Delivered {} reminder(s)", self.report.delivered.len())];
        for r in &self.report.delivered {
            lines.push(format!(
                "  {} {} {} ({}d, {}/{})",
                r.artifact_id,
                r.stage,
                r.kind.as_str(),
                r.days_offset,
                r.sequence,
                r.total_expected
            ));
        }
        for outcome in &self.report.escalated {
            lines.push(format!(
                "Escalated {}: {} -> {}",
                outcome.artifact_id, outcome.from_stage, outcome.to_stage
            ));
        }
        for id in &self.report.blocked {
            lines.push(format!("Blocked {id}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ReminderListOutput {
    pub reminders: Vec<ScheduledReminder>,
    pub total: usize,
}

impl CommandOutput for ReminderListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "stage", "kind", "fire at", "due", "priority", "state"]);
        for r in &self.reminders {
            table.add_row(vec![
                format!("{}/{}", r.sequence, r.total_expected),
                r.stage.clone(),
                r.kind.as_str().to_string(),
                r.fire_at.format("%Y-%m-%d").to_string(),
                r.due_at.format("%Y-%m-%d").to_string(),
                r.priority.as_str().to_string(),
                style_status(r.state.as_str()),
            ]);
        }
        render_list("reminder", &table, self.total)
    }
}

pub async fn execute(args: RemindersArgs, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;

    match args.command {
        ReminderCommands::Tick => {
            let report = runtime.tick().await?;
            output(&TickOutput { report }, json_mode);
        }

        ReminderCommands::Run => {
            runtime
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "failed to listen for shutdown signal");
                    }
                })
                .await;
        }

        ReminderCommands::List { id } => {
            let reminders = runtime.reminders(id).await?;
            let out = ReminderListOutput {
                total: reminders.len(),
                reminders,
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
    fn test_empty_tick_output() {
        let out = TickOutput {
            report: TickReport::default(),
        };
        assert_eq!(out.to_human(), "No reminders due.");
        assert_eq!(out.to_json()["delivered"], serde_json::json!([]));
    }
}
