//! Domain errors for the privflow workflow engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the workflow engine.
///
/// Validation errors (`UnknownStage`, `InvalidTransition`) and
/// `ConcurrencyConflict` are the only variants a caller of a transition is
/// expected to act on; everything else is an infrastructure failure.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(Uuid),

    #[error("Unknown stage '{stage}' for {kind} workflow")]
    UnknownStage { kind: String, stage: String },

    #[error("Invalid transition from {from} to {to}: {reason}")]
    InvalidTransition { from: String, to: String, reason: String },

    #[error("Concurrency conflict: workflow of artifact {artifact_id} was modified (expected version {expected_version})")]
    ConcurrencyConflict { artifact_id: Uuid, expected_version: u64 },

    #[error("Unknown artifact kind: {0}")]
    UnknownKind(String),

    #[error("Notification template not found: {0}")]
    TemplateNotFound(String),

    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Whether the error is a rejected transition request, as opposed to a
    /// conflict or an infrastructure failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownStage { .. } | Self::InvalidTransition { .. } | Self::ValidationFailed(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
