pub mod artifact;
pub mod config;
pub mod notification;
pub mod progress;
pub mod reminder;
pub mod stage;

pub use artifact::{field, Artifact, ArtifactFields, ArtifactKind, NotificationCategory, Stakeholder};
pub use config::{
    ChatWebhookConfig, Config, DatabaseConfig, IdentityConfig, LoggingConfig, NotificationConfig,
    ReminderConfig, WorkflowConfig,
};
pub use notification::{
    Channel, ChatMessage, DashboardNotification, DeliveryFailure, DeliveryResult, EmailMessage,
    Identity, NotificationTemplate, Priority, Recipient, RecipientSpec, RenderedMessage,
};
pub use progress::{StageProgressStatus, TimelineEntry, WorkflowMetrics, WorkflowProgress};
pub use reminder::{
    expand_plan, ReminderKind, ReminderOffset, ReminderPlan, ReminderState, ScheduledReminder,
};
pub use stage::{
    DependentSpec, HistoryEvent, RecipientRule, StageDeadline, StageFlag, StageNotification,
    StageTransitionRecord, WorkflowDefinition, WorkflowStage, WorkflowState,
};
