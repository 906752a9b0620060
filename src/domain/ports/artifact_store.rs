//! Artifact store port.
//!
//! The content store is external to the workflow engine; this is the narrow
//! interface the engine needs from it.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Artifact, ArtifactKind};

/// Repository interface for artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Get an artifact by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Artifact>>;

    /// Create an artifact and return its ID.
    async fn create(&self, artifact: &Artifact) -> DomainResult<Uuid>;

    /// Set a single typed or opaque field. A `null` value clears it.
    async fn update_field(&self, id: Uuid, key: &str, value: Value) -> DomainResult<()>;

    /// Set the store status (draft, pending, publish, ...).
    async fn set_status(&self, id: Uuid, status: &str) -> DomainResult<()>;

    /// List artifacts, optionally filtered by kind, newest first.
    async fn list(&self, kind: Option<ArtifactKind>) -> DomainResult<Vec<Artifact>>;
}
