//! Delivery sink ports used by the notification dispatcher.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ChatMessage, DashboardNotification, EmailMessage};

/// Outbound email transport.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> DomainResult<()>;
}

/// Persistent per-user dashboard inbox.
#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn save(&self, notification: &DashboardNotification) -> DomainResult<()>;

    /// Notifications for a user, newest first.
    async fn list_for_user(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> DomainResult<Vec<DashboardNotification>>;

    /// Mark a notification read. Returns `false` if it does not exist.
    async fn mark_read(&self, id: Uuid) -> DomainResult<bool>;
}

/// Chat webhook client.
#[async_trait]
pub trait ChatWebhook: Send + Sync {
    /// Whether the webhook is configured. Disabled webhooks are skipped
    /// without counting as failures.
    fn is_enabled(&self) -> bool;

    async fn post(&self, message: &ChatMessage) -> DomainResult<()>;
}
