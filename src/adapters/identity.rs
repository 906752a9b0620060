//! Identity resolver backed by the configured identity directory.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Identity, IdentityConfig};
use crate::domain::ports::IdentityResolver;

/// In-memory directory of identities and their roles.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    identities: HashMap<String, Identity>,
    /// Role name to identity ids, in configuration order.
    roles: HashMap<String, Vec<String>>,
}

impl StaticIdentityResolver {
    pub fn new(entries: &[IdentityConfig]) -> Self {
        let mut identities = HashMap::new();
        let mut roles: HashMap<String, Vec<String>> = HashMap::new();

        for entry in entries {
            let identity = Identity {
                id: entry.id.clone(),
                email: entry.email.clone(),
                display_name: entry.display_name.clone().unwrap_or_else(|| entry.id.clone()),
            };
            for role in &entry.roles {
                let members = roles.entry(role.clone()).or_default();
                if !members.contains(&entry.id) {
                    members.push(entry.id.clone());
                }
            }
            identities.insert(entry.id.clone(), identity);
        }

        Self { identities, roles }
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn users_with_role(&self, role: &str) -> DomainResult<Vec<Identity>> {
        Ok(self
            .roles
            .get(role)
            .map(|ids| ids.iter().filter_map(|id| self.identities.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn get_identity(&self, id: &str) -> DomainResult<Option<Identity>> {
        Ok(self.identities.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticIdentityResolver {
        StaticIdentityResolver::new(&[
            IdentityConfig {
                id: "olivia".to_string(),
                email: "olivia@example.org".to_string(),
                display_name: Some("Olivia Officer".to_string()),
                roles: vec!["privacy_officer".to_string()],
            },
            IdentityConfig {
                id: "carl".to_string(),
                email: "carl@example.org".to_string(),
                display_name: None,
                roles: vec!["collection_owner".to_string(), "privacy_officer".to_string()],
            },
        ])
    }

    #[tokio::test]
    async fn test_users_with_role() {
        let resolver = directory();
        let officers = resolver.users_with_role("privacy_officer").await.unwrap();
        assert_eq!(officers.len(), 2);
        assert_eq!(officers[0].id, "olivia");
        assert!(resolver.users_with_role("auditor").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_display_name_falls_back_to_id() {
        let resolver = directory();
        let carl = resolver.get_identity("carl").await.unwrap().unwrap();
        assert_eq!(carl.display_name, "carl");
        assert!(resolver.get_identity("nobody").await.unwrap().is_none());
    }
}
