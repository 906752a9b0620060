//! Notification dispatcher.
//!
//! Renders a template and delivers it over one channel. Recipients are
//! resolved at dispatch time. Each recipient is delivered independently with
//! its own timeout, so one bad address never blocks or fails the others.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Channel, ChatMessage, DashboardNotification, DeliveryResult, EmailMessage, Priority, Recipient,
    RecipientSpec, RenderedMessage,
};
use crate::domain::ports::{ArtifactStore, ChatWebhook, DashboardStore, EmailTransport, IdentityResolver};
use crate::services::observability::SideEffectCounters;
use crate::services::template::{render, TemplateData, TemplateRegistry};

/// A notification request.
#[derive(Debug, Clone)]
pub struct Notification {
    pub template_id: String,
    /// Overrides the template's channel.
    pub channel: Option<Channel>,
    /// Overrides the template's priority.
    pub priority: Option<Priority>,
    pub data: TemplateData,
    pub recipients: RecipientSpec,
}

impl Notification {
    pub fn new(template_id: impl Into<String>, recipients: RecipientSpec) -> Self {
        Self {
            template_id: template_id.into(),
            channel: None,
            priority: None,
            data: TemplateData::new(),
            recipients,
        }
    }

    pub fn via(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_data(mut self, data: TemplateData) -> Self {
        self.data.extend(data);
        self
    }

    pub fn set(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    fn artifact_id(&self) -> Option<Uuid> {
        self.data.get("artifact_id").and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// Sinks the dispatcher delivers to.
#[derive(Clone)]
pub struct DeliverySinks {
    pub email: Arc<dyn EmailTransport>,
    pub dashboard: Arc<dyn DashboardStore>,
    pub webhook: Arc<dyn ChatWebhook>,
}

pub struct NotificationDispatcher {
    templates: Arc<TemplateRegistry>,
    identities: Arc<dyn IdentityResolver>,
    artifacts: Arc<dyn ArtifactStore>,
    sinks: DeliverySinks,
    counters: Arc<SideEffectCounters>,
    delivery_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        templates: Arc<TemplateRegistry>,
        identities: Arc<dyn IdentityResolver>,
        artifacts: Arc<dyn ArtifactStore>,
        sinks: DeliverySinks,
        counters: Arc<SideEffectCounters>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            templates,
            identities,
            artifacts,
            sinks,
            counters,
            delivery_timeout,
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn webhook_enabled(&self) -> bool {
        self.sinks.webhook.is_enabled()
    }

    /// Render `template_id` against `data` and deliver it.
    pub async fn notify(
        &self,
        template_id: &str,
        channel_override: Option<Channel>,
        data: &TemplateData,
        recipients: &RecipientSpec,
    ) -> DomainResult<DeliveryResult> {
        let mut notification = Notification::new(template_id, recipients.clone()).with_data(data.clone());
        notification.channel = channel_override;
        self.send(&notification).await
    }

    /// Deliver a notification. Errors only for an unknown template or a
    /// recipient lookup failure; per-recipient failures are reported in the
    /// result.
    pub async fn send(&self, notification: &Notification) -> DomainResult<DeliveryResult> {
        let template = self.templates.get(&notification.template_id)?;
        let channel = notification.channel.unwrap_or(template.channel);
        let mut message = render(template, &notification.data);
        if let Some(priority) = notification.priority {
            message.priority = priority;
        }

        let recipients = self.resolve(&notification.recipients).await?;
        let artifact_id = notification.artifact_id();

        let result = match channel {
            Channel::Email => self.deliver_email(&message, &recipients, artifact_id).await,
            Channel::Dashboard => self.deliver_dashboard(&message, &recipients, artifact_id).await,
            Channel::SystemLog => self.deliver_log(&message, &recipients, artifact_id),
            Channel::ChatWebhook => self.deliver_webhook(&message, artifact_id).await,
        };

        tracing::debug!(
            template_id = %message.template_id,
            channel = %channel,
            delivered = result.delivered,
            failed = result.failed,
            skipped = result.skipped,
            "notification dispatched"
        );
        Ok(result)
    }

    /// Resolve a recipient spec to concrete recipients, de-duplicated.
    pub async fn resolve(&self, spec: &RecipientSpec) -> DomainResult<Vec<Recipient>> {
        let mut recipients: Vec<Recipient> = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |r: Recipient, out: &mut Vec<Recipient>| {
            let key = r.user_id.clone().or_else(|| r.email.clone()).unwrap_or_else(|| r.display_name.clone());
            if seen.insert(key) {
                out.push(r);
            }
        };

        match spec {
            RecipientSpec::Users(ids) => {
                for id in ids {
                    match self.identities.get_identity(id).await? {
                        Some(identity) => push(identity.into(), &mut recipients),
                        None => tracing::warn!(identity = %id, "notification recipient not found"),
                    }
                }
            }
            RecipientSpec::Roles(roles) => {
                for role in roles {
                    let members = self.identities.users_with_role(role).await?;
                    if members.is_empty() {
                        tracing::debug!(role = %role, "no identities hold role");
                    }
                    for identity in members {
                        push(identity.into(), &mut recipients);
                    }
                }
            }
            RecipientSpec::Stakeholders { artifact_id, category } => {
                let artifact = self
                    .artifacts
                    .get(*artifact_id)
                    .await?
                    .ok_or(DomainError::ArtifactNotFound(*artifact_id))?;
                for stakeholder in artifact.fields.stakeholders.iter().filter(|s| s.subscribed_to(*category)) {
                    push(
                        Recipient {
                            user_id: None,
                            email: Some(stakeholder.email.clone()),
                            display_name: stakeholder.name.clone(),
                        },
                        &mut recipients,
                    );
                }
            }
            RecipientSpec::Nobody => {}
        }

        Ok(recipients)
    }

    async fn deliver_email(
        &self,
        message: &RenderedMessage,
        recipients: &[Recipient],
        artifact_id: Option<Uuid>,
    ) -> DeliveryResult {
        let mut result = DeliveryResult::new(&message.template_id, Channel::Email);

        let sends = recipients.iter().filter_map(|recipient| {
            let Some(address) = recipient.email.clone() else {
                result.record_skip();
                return None;
            };
            let email = EmailMessage {
                id: Uuid::new_v4(),
                to: address,
                subject: message.subject.clone(),
                body: message.body.clone(),
                template_id: message.template_id.clone(),
                created_at: Utc::now(),
            };
            Some(async move {
                let outcome = self.bounded(self.sinks.email.send(&email)).await;
                (email.to, outcome)
            })
        });
        let outcomes = join_all(sends.collect::<Vec<_>>()).await;

        for (address, outcome) in outcomes {
            self.record(&mut result, &address, outcome, artifact_id);
        }
        result
    }

    async fn deliver_dashboard(
        &self,
        message: &RenderedMessage,
        recipients: &[Recipient],
        artifact_id: Option<Uuid>,
    ) -> DeliveryResult {
        let mut result = DeliveryResult::new(&message.template_id, Channel::Dashboard);

        for recipient in recipients {
            let Some(user_id) = recipient.user_id.clone() else {
                result.record_skip();
                continue;
            };
            let notification = DashboardNotification {
                id: Uuid::new_v4(),
                user_id,
                template_id: message.template_id.clone(),
                title: message.subject.clone(),
                message: message.body.clone(),
                priority: message.priority,
                artifact_id,
                is_read: false,
                created_at: Utc::now(),
                read_at: None,
            };
            let outcome = self.bounded(self.sinks.dashboard.save(&notification)).await;
            self.record(&mut result, &notification.user_id, outcome, artifact_id);
        }
        result
    }

    fn deliver_log(&self, message: &RenderedMessage, recipients: &[Recipient], artifact_id: Option<Uuid>) -> DeliveryResult {
        let mut result = DeliveryResult::new(&message.template_id, Channel::SystemLog);
        tracing::info!(
            target: "privflow::notifications",
            template_id = %message.template_id,
            priority = message.priority.as_str(),
            artifact_id = ?artifact_id,
            recipients = recipients.len(),
            subject = %message.subject,
            "{}",
            message.body
        );
        result.record_success();
        result
    }

    async fn deliver_webhook(&self, message: &RenderedMessage, artifact_id: Option<Uuid>) -> DeliveryResult {
        let mut result = DeliveryResult::new(&message.template_id, Channel::ChatWebhook);
        if !self.sinks.webhook.is_enabled() {
            result.record_skip();
            return result;
        }

        let chat = ChatMessage {
            title: message.subject.clone(),
            text: message.body.clone(),
            color: message.priority.color().to_string(),
            priority: message.priority,
        };
        match self.bounded(self.sinks.webhook.post(&chat)).await {
            Ok(()) => result.record_success(),
            Err(e) => {
                self.counters.webhook_failed();
                tracing::warn!(
                    template_id = %message.template_id,
                    channel = "chat_webhook",
                    artifact_id = ?artifact_id,
                    error = %e,
                    "chat webhook delivery failed"
                );
                result.record_failure("chat_webhook", e.to_string());
            }
        }
        result
    }

    async fn bounded<F>(&self, send: F) -> DomainResult<()>
    where
        F: std::future::Future<Output = DomainResult<()>>,
    {
        match tokio::time::timeout(self.delivery_timeout, send).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DomainError::DeliveryFailed(format!(
                "timed out after {}s",
                self.delivery_timeout.as_secs_f64()
            ))),
        }
    }

    fn record(&self, result: &mut DeliveryResult, recipient: &str, outcome: DomainResult<()>, artifact_id: Option<Uuid>) {
        match outcome {
            Ok(()) => result.record_success(),
            Err(e) => {
                self.counters.notification_failed();
                tracing::warn!(
                    template_id = %result.template_id,
                    channel = %result.channel,
                    recipient = %recipient,
                    artifact_id = ?artifact_id,
                    error = %e,
                    "notification delivery failed"
                );
                result.record_failure(recipient, e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::identity::StaticIdentityResolver;
    use crate::adapters::webhook::HttpChatWebhook;
    use crate::domain::models::{Artifact, ArtifactFields, ArtifactKind, IdentityConfig, NotificationCategory, Stakeholder};
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEmail {
        sent: Mutex<Vec<EmailMessage>>,
        reject: Option<String>,
        hang_for: Option<String>,
    }

    #[async_trait]
    impl EmailTransport for RecordingEmail {
        async fn send(&self, message: &EmailMessage) -> DomainResult<()> {
            if self.hang_for.as_deref() == Some(message.to.as_str()) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if self.reject.as_deref() == Some(message.to.as_str()) {
                return Err(DomainError::DeliveryFailed("mailbox unavailable".to_string()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryDashboard {
        saved: Mutex<Vec<DashboardNotification>>,
    }

    #[async_trait]
    impl DashboardStore for MemoryDashboard {
        async fn save(&self, notification: &DashboardNotification) -> DomainResult<()> {
            self.saved.lock().unwrap().push(notification.clone());
            Ok(())
        }

        async fn list_for_user(&self, user_id: &str, _unread_only: bool) -> DomainResult<Vec<DashboardNotification>> {
            Ok(self.saved.lock().unwrap().iter().filter(|n| n.user_id == user_id).cloned().collect())
        }

        async fn mark_read(&self, _id: Uuid) -> DomainResult<bool> {
            Ok(false)
        }
    }

    #[derive(Default)]
    struct MemoryArtifacts {
        artifacts: Mutex<HashMap<Uuid, Artifact>>,
    }

    #[async_trait]
    impl ArtifactStore for MemoryArtifacts {
        async fn get(&self, id: Uuid) -> DomainResult<Option<Artifact>> {
            Ok(self.artifacts.lock().unwrap().get(&id).cloned())
        }

        async fn create(&self, artifact: &Artifact) -> DomainResult<Uuid> {
            self.artifacts.lock().unwrap().insert(artifact.id, artifact.clone());
            Ok(artifact.id)
        }

        async fn update_field(&self, _id: Uuid, _key: &str, _value: serde_json::Value) -> DomainResult<()> {
            Ok(())
        }

        async fn set_status(&self, _id: Uuid, _status: &str) -> DomainResult<()> {
            Ok(())
        }

        async fn list(&self, _kind: Option<ArtifactKind>) -> DomainResult<Vec<Artifact>> {
            Ok(Vec::new())
        }
    }

    fn identities() -> Arc<StaticIdentityResolver> {
        Arc::new(StaticIdentityResolver::new(&[
            IdentityConfig {
                id: "olivia".to_string(),
                email: "olivia@example.org".to_string(),
                display_name: None,
                roles: vec!["privacy_officer".to_string()],
            },
            IdentityConfig {
                id: "carl".to_string(),
                email: "carl@example.org".to_string(),
                display_name: None,
                roles: vec!["collection_owner".to_string(), "privacy_officer".to_string()],
            },
        ]))
    }

    struct Fixture {
        dispatcher: NotificationDispatcher,
        email: Arc<RecordingEmail>,
        dashboard: Arc<MemoryDashboard>,
        artifacts: Arc<MemoryArtifacts>,
        counters: Arc<SideEffectCounters>,
    }

    fn fixture(email: RecordingEmail) -> Fixture {
        let email = Arc::new(email);
        let dashboard = Arc::new(MemoryDashboard::default());
        let artifacts = Arc::new(MemoryArtifacts::default());
        let counters = Arc::new(SideEffectCounters::new());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(TemplateRegistry::builtin()),
            identities(),
            artifacts.clone(),
            DeliverySinks {
                email: email.clone(),
                dashboard: dashboard.clone(),
                webhook: Arc::new(HttpChatWebhook::disabled()),
            },
            counters.clone(),
            Duration::from_millis(200),
        );
        Fixture {
            dispatcher,
            email,
            dashboard,
            artifacts,
            counters,
        }
    }

    fn roles() -> RecipientSpec {
        RecipientSpec::Roles(vec!["privacy_officer".to_string(), "collection_owner".to_string()])
    }

    #[tokio::test]
    async fn test_roles_resolve_without_duplicates() {
        let f = fixture(RecordingEmail::default());
        let data: TemplateData = [("title".to_string(), "CRM".to_string())].into_iter().collect();

        let result = f.dispatcher.notify("pta_required", None, &data, &roles()).await.unwrap();

        assert_eq!(result.delivered, 2);
        let sent = f.email.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "PTA required: CRM");
    }

    #[tokio::test]
    async fn test_one_failed_recipient_does_not_stop_others() {
        let f = fixture(RecordingEmail {
            reject: Some("olivia@example.org".to_string()),
            ..Default::default()
        });

        let result = f.dispatcher.notify("approved", None, &TemplateData::new(), &roles()).await.unwrap();

        assert_eq!(result.delivered, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].recipient, "olivia@example.org");
        assert_eq!(f.counters.snapshot().notification_failures, 1);
    }

    #[tokio::test]
    async fn test_slow_recipient_times_out() {
        let f = fixture(RecordingEmail {
            hang_for: Some("carl@example.org".to_string()),
            ..Default::default()
        });

        let result = f.dispatcher.notify("approved", None, &TemplateData::new(), &roles()).await.unwrap();

        assert_eq!(result.delivered, 1);
        assert_eq!(result.failed, 1);
        assert!(result.failures[0].error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_stakeholders_filtered_by_category() {
        let f = fixture(RecordingEmail::default());
        let fields = ArtifactFields {
            stakeholders: vec![
                Stakeholder {
                    name: "Dana".to_string(),
                    email: "dana@example.org".to_string(),
                    role: "analyst".to_string(),
                    categories: BTreeSet::from([NotificationCategory::StatusChange]),
                },
                Stakeholder {
                    name: "Eve".to_string(),
                    email: "eve@example.org".to_string(),
                    role: "legal".to_string(),
                    categories: BTreeSet::from([NotificationCategory::Comments]),
                },
            ],
            ..Default::default()
        };
        let artifact = Artifact::new(ArtifactKind::Collection, "CRM").with_fields(fields);
        f.artifacts.create(&artifact).await.unwrap();

        let spec = RecipientSpec::Stakeholders {
            artifact_id: artifact.id,
            category: NotificationCategory::StatusChange,
        };
        let result = f.dispatcher.notify("stage_changed", None, &TemplateData::new(), &spec).await.unwrap();

        assert_eq!(result.delivered, 1);
        assert_eq!(f.email.sent.lock().unwrap()[0].to, "dana@example.org");
    }

    #[tokio::test]
    async fn test_dashboard_channel_override_skips_addressless_recipients() {
        let f = fixture(RecordingEmail::default());
        let notification = Notification::new(
            "stage_changed",
            RecipientSpec::Users(vec!["olivia".to_string(), "ghost".to_string()]),
        )
        .via(Channel::Dashboard)
        .with_priority(Priority::Urgent)
        .set("title", "CRM");

        let result = f.dispatcher.send(&notification).await.unwrap();

        assert_eq!(result.channel, Channel::Dashboard);
        assert_eq!(result.delivered, 1);
        let saved = f.dashboard.saved.lock().unwrap();
        assert_eq!(saved[0].user_id, "olivia");
        assert_eq!(saved[0].priority, Priority::Urgent);
        assert!(!saved[0].is_read);
    }

    #[tokio::test]
    async fn test_disabled_webhook_is_skipped_not_failed() {
        let f = fixture(RecordingEmail::default());
        let result = f
            .dispatcher
            .notify("approved", Some(Channel::ChatWebhook), &TemplateData::new(), &RecipientSpec::Nobody)
            .await
            .unwrap();

        assert_eq!(result.skipped, 1);
        assert!(result.is_clean());
        assert_eq!(f.counters.snapshot().webhook_failures, 0);
    }

    #[tokio::test]
    async fn test_system_log_never_fails() {
        let f = fixture(RecordingEmail::default());
        let result = f
            .dispatcher
            .notify("approved", Some(Channel::SystemLog), &TemplateData::new(), &RecipientSpec::Nobody)
            .await
            .unwrap();
        assert_eq!(result.delivered, 1);
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let f = fixture(RecordingEmail::default());
        let err = f
            .dispatcher
            .notify("missing", None, &TemplateData::new(), &RecipientSpec::Nobody)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TemplateNotFound(_)));
    }
}
