//! Chat webhook client.
//!
//! Posts Slack-compatible attachment payloads to an incoming-webhook URL.
//! A webhook without a URL, or with `enabled: false`, reports itself as
//! disabled and the dispatcher skips it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChatMessage, ChatWebhookConfig};
use crate::domain::ports::ChatWebhook;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    text: &'a str,
    attachments: Vec<Attachment<'a>>,
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    color: &'a str,
    title: &'a str,
    text: &'a str,
    footer: &'static str,
}

/// HTTP client for a chat incoming webhook.
#[derive(Debug, Clone)]
pub struct HttpChatWebhook {
    http: Client,
    url: Option<String>,
    username: Option<String>,
}

impl HttpChatWebhook {
    /// Build a client from configuration. Requests are bounded by `timeout`.
    pub fn from_config(config: &ChatWebhookConfig, timeout: Duration) -> DomainResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::Configuration(format!("failed to build webhook client: {e}")))?;

        Ok(Self {
            http,
            url: config.is_active().then(|| config.url.clone()).flatten(),
            username: config.username.clone(),
        })
    }

    /// A webhook that is never called.
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            url: None,
            username: None,
        }
    }
}

#[async_trait]
impl ChatWebhook for HttpChatWebhook {
    fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    async fn post(&self, message: &ChatMessage) -> DomainResult<()> {
        let Some(url) = self.url.as_deref() else {
            return Ok(());
        };

        let payload = WebhookPayload {
            username: self.username.as_deref(),
            text: &message.title,
            attachments: vec![Attachment {
                color: &message.color,
                title: &message.title,
                text: &message.text,
                footer: "privflow",
            }],
        };

        let resp = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DomainError::DeliveryFailed(format!("chat webhook request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::DeliveryFailed(format!(
                "chat webhook returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_url() {
        let config = ChatWebhookConfig {
            enabled: true,
            url: None,
            username: None,
        };
        let webhook = HttpChatWebhook::from_config(&config, Duration::from_secs(1)).unwrap();
        assert!(!webhook.is_enabled());
        assert!(!HttpChatWebhook::disabled().is_enabled());
    }

    #[test]
    fn test_disabled_flag_wins_over_url() {
        let config = ChatWebhookConfig {
            enabled: false,
            url: Some("https://hooks.example.org/T000".to_string()),
            username: None,
        };
        let webhook = HttpChatWebhook::from_config(&config, Duration::from_secs(1)).unwrap();
        assert!(!webhook.is_enabled());
    }
}
