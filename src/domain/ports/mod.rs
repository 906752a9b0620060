//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - ArtifactStore: the external content store
//! - WorkflowRepository: workflow state and stage history
//! - ReminderRepository: scheduled reminders
//! - IdentityResolver: roles and identities
//! - EmailTransport, DashboardStore, ChatWebhook: notification sinks

pub mod artifact_store;
pub mod delivery;
pub mod identity;
pub mod reminder_repository;
pub mod workflow_repository;

pub use artifact_store::ArtifactStore;
pub use delivery::{ChatWebhook, DashboardStore, EmailTransport};
pub use identity::IdentityResolver;
pub use reminder_repository::ReminderRepository;
pub use workflow_repository::WorkflowRepository;
