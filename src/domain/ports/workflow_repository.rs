//! Workflow state repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{StageTransitionRecord, WorkflowState};

/// Repository interface for workflow state and stage history.
///
/// State and history are always written together: every committed change
/// bumps the state version by one and appends exactly one history record
/// whose sequence equals the new version.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Get the workflow state of an artifact.
    async fn get_state(&self, artifact_id: Uuid) -> DomainResult<Option<WorkflowState>>;

    /// Insert the first state (version 1) and its opening history record.
    ///
    /// Returns `false` without writing anything when the artifact already has
    /// a workflow state.
    async fn initialize(
        &self,
        state: &WorkflowState,
        record: &StageTransitionRecord,
    ) -> DomainResult<bool>;

    /// Replace the state and append the record if the stored version still
    /// equals `expected_version`.
    ///
    /// Fails with `ConcurrencyConflict` when another writer got there first.
    /// Returns the committed state with its new version.
    async fn commit(
        &self,
        expected_version: u64,
        state: &WorkflowState,
        record: &StageTransitionRecord,
    ) -> DomainResult<WorkflowState>;

    /// Full history of an artifact, ordered by sequence.
    async fn history(&self, artifact_id: Uuid) -> DomainResult<Vec<StageTransitionRecord>>;

    /// All workflow states, ordered by last update.
    async fn list_states(&self) -> DomainResult<Vec<WorkflowState>>;
}
