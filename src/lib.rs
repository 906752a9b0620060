//! Privflow - workflow state machine and notification engine for
//! privacy-compliance artifacts.
//!
//! Collections, privacy threshold assessments (PTA), privacy impact
//! assessments (PIA) and generic documents each move through a fixed chain
//! of stages. Entering a stage can create a dependent artifact, notify roles
//! and stakeholders over email, dashboard and chat webhook, and schedule
//! deadline reminders.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Service Layer** (`services`): state machine, tracker, dispatcher,
//!   scheduler and event bus
//! - **Adapters** (`adapters`): SQLite stores, identity directory, webhook client
//! - **Application Layer** (`application`): the assembled runtime
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use privflow::{ArtifactFields, ArtifactKind, Config, WorkflowRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = WorkflowRuntime::open(Config::default()).await?;
//!     let (artifact, _) = runtime
//!         .create_artifact(ArtifactKind::Collection, "Survey", Some("carl"), ArtifactFields::default(), "carl")
//!         .await?;
//!     runtime.transition(artifact.id, "pta_required", "carl", None).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use application::{TickReport, WorkflowRuntime};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Artifact, ArtifactFields, ArtifactKind, Config, StageTransitionRecord, WorkflowMetrics, WorkflowProgress,
    WorkflowState,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{TransitionOutcome, WorkflowEvent, SYSTEM_ACTOR};
