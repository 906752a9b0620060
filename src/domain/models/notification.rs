//! Notification domain types: templates, recipients, rendered messages and
//! delivery results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::NotificationCategory;

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Dashboard,
    SystemLog,
    ChatWebhook,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Dashboard => "dashboard",
            Self::SystemLog => "system_log",
            Self::ChatWebhook => "chat_webhook",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email" => Some(Self::Email),
            "dashboard" => Some(Self::Dashboard),
            "system_log" | "log" => Some(Self::SystemLog),
            "chat_webhook" | "chat" | "slack" => Some(Self::ChatWebhook),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// Attachment colour used by the chat webhook.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Low => "#36a64f",
            Self::Normal => "#2196f3",
            Self::High => "#ffb300",
            Self::Urgent => "#d32f2f",
        }
    }
}

/// A registered notification template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub channel: Channel,
    #[serde(default)]
    pub priority: Priority,
    /// Category used when recipients are artifact stakeholders.
    #[serde(default = "default_category")]
    pub category: NotificationCategory,
}

fn default_category() -> NotificationCategory {
    NotificationCategory::StatusChange
}

/// An identity known to the identity resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub display_name: String,
}

/// Who a notification goes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RecipientSpec {
    /// Explicit identity ids.
    Users(Vec<String>),
    /// Role names, resolved at dispatch time.
    Roles(Vec<String>),
    /// Stakeholders of an artifact subscribed to a category.
    Stakeholders {
        artifact_id: Uuid,
        category: NotificationCategory,
    },
    /// No individual recipients (system log and chat webhook).
    Nobody,
}

/// A resolved recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Identity id; stakeholders without an account have none.
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: String,
}

impl Recipient {
    pub fn label(&self) -> &str {
        self.email
            .as_deref()
            .or(self.user_id.as_deref())
            .unwrap_or(&self.display_name)
    }
}

impl From<Identity> for Recipient {
    fn from(identity: Identity) -> Self {
        Self {
            user_id: Some(identity.id),
            email: Some(identity.email),
            display_name: identity.display_name,
        }
    }
}

/// A template rendered against a data map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub template_id: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    /// Placeholders that had no value and were left verbatim.
    pub missing_tokens: Vec<String>,
}

/// An email addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: Uuid,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub template_id: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted dashboard notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardNotification {
    pub id: Uuid,
    pub user_id: String,
    pub template_id: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub artifact_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Payload POSTed to the chat webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub title: String,
    pub text: String,
    pub color: String,
    pub priority: Priority,
}

/// A single failed recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub recipient: String,
    pub error: String,
}

/// Outcome of one `notify` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub template_id: String,
    pub channel: Channel,
    pub delivered: usize,
    pub failed: usize,
    /// Recipients the channel cannot address (e.g. no email) or a disabled
    /// webhook.
    pub skipped: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryResult {
    pub fn new(template_id: &str, channel: Channel) -> Self {
        Self {
            template_id: template_id.to_string(),
            channel,
            delivered: 0,
            failed: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.delivered += 1;
    }

    pub fn record_failure(&mut self, recipient: impl Into<String>, error: impl Into<String>) {
        self.failed += 1;
        self.failures.push(DeliveryFailure {
            recipient: recipient.into(),
            error: error.into(),
        });
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_colors() {
        assert_eq!(Priority::Low.color(), "#36a64f");
        assert_eq!(Priority::Normal.color(), "#2196f3");
        assert_eq!(Priority::High.color(), "#ffb300");
        assert_eq!(Priority::Urgent.color(), "#d32f2f");
        assert!(Priority::Urgent > Priority::Low);
    }

    #[test]
    fn test_delivery_result_counts() {
        let mut result = DeliveryResult::new("pta_required", Channel::Email);
        result.record_success();
        result.record_failure("bad@example", "mailbox unavailable");
        result.record_skip();

        assert_eq!(result.delivered, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert!(!result.is_clean());
        assert_eq!(result.failures[0].recipient, "bad@example");
    }

    #[test]
    fn test_recipient_label_prefers_email() {
        let r = Recipient {
            user_id: Some("u1".to_string()),
            email: None,
            display_name: "Uma".to_string(),
        };
        assert_eq!(r.label(), "u1");
    }
}
