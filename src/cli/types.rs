//! CLI type definitions
//!
//! Top-level clap structures. Each command's arguments live with the command.

use clap::{Parser, Subcommand};

use crate::cli::commands::artifact::ArtifactArgs;
use crate::cli::commands::inbox::InboxArgs;
use crate::cli::commands::init::InitArgs;
use crate::cli::commands::reminders::RemindersArgs;
use crate::cli::commands::workflow::{ArtifactRef, BlockArgs, StagesArgs, TransitionArgs};

#[derive(Parser, Debug)]
#[command(name = "privflow")]
#[command(about = "Privflow - privacy-compliance workflow and notification engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the .privflow directory, configuration and database
    Init(InitArgs),

    /// Create and inspect artifacts
    Artifact(ArtifactArgs),

    /// Move an artifact to another workflow stage
    Transition(TransitionArgs),

    /// Flag the current stage of an artifact as blocked
    Block(BlockArgs),

    /// Clear the blocked flag of an artifact
    Unblock(BlockArgs),

    /// Show workflow progress of an artifact
    Progress(ArtifactRef),

    /// Show workflow metrics of an artifact
    Metrics(ArtifactRef),

    /// Show the stage history of an artifact
    History(ArtifactRef),

    /// List the stages of a workflow kind
    Stages(StagesArgs),

    /// Deliver due reminders
    Reminders(RemindersArgs),

    /// Read dashboard notifications
    Inbox(InboxArgs),
}
