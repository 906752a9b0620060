//! Identity resolver port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Identity;

/// Resolves role names and identity references to addressable users.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Every identity holding `role`. Unknown roles resolve to nobody.
    async fn users_with_role(&self, role: &str) -> DomainResult<Vec<Identity>>;

    /// Look up a single identity.
    async fn get_identity(&self, id: &str) -> DomainResult<Option<Identity>>;
}
