//! Dashboard inbox CLI commands.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use uuid::Uuid;

use crate::cli::output::{action_success, list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::open_runtime;
use crate::domain::models::DashboardNotification;

#[derive(Args, Debug)]
pub struct InboxArgs {
    #[command(subcommand)]
    pub command: InboxCommands,
}

#[derive(Subcommand, Debug)]
pub enum InboxCommands {
    /// List dashboard notifications for a user
    List {
        /// User id
        user: String,

        /// Only show unread notifications
        #[arg(short, long)]
        unread: bool,
    },
    /// Mark a notification as read
    Read {
        /// Notification ID
        id: Uuid,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct InboxListOutput {
    pub user: String,
    pub notifications: Vec<DashboardNotification>,
    pub total: usize,
}

impl CommandOutput for InboxListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "when", "priority", "title", "artifact", "read"]);
        for n in &self.notifications {
            table.add_row(vec![
                short_id(&n.id),
                n.created_at.format("%Y-%m-%d %H:%M").to_string(),
                n.priority.as_str().to_string(),
                truncate(&n.title, 50),
                n.artifact_id.as_ref().map_or_else(|| "-".to_string(), short_id),
                if n.is_read { "yes" } else { "no" }.to_string(),
            ]);
        }
        render_list("notification", &table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct MarkReadOutput {
    pub id: Uuid,
    pub success: bool,
}

impl CommandOutput for MarkReadOutput {
    fn to_human(&self) -> String {
        action_success(&format!("Notification {} marked as read", self.id))
    }
}

pub async fn execute(args: InboxArgs, json_mode: bool) -> Result<()> {
    let runtime = open_runtime().await?;

    match args.command {
        InboxCommands::List { user, unread } => {
            let notifications = runtime.inbox(&user, unread).await?;
            let out = InboxListOutput {
                user,
                total: notifications.len(),
                notifications,
            };
            output(&out, json_mode);
        }

        InboxCommands::Read { id } => {
            if !runtime.mark_read(id).await? {
                bail!("Notification not found: {id}");
            }
            output(&MarkReadOutput { id, success: true }, json_mode);
        }
    }
    Ok(())
}
