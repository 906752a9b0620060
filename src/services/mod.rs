pub mod artifact_locks;
pub mod builtin_handlers;
pub mod event_bus;
pub mod notification_dispatcher;
pub mod observability;
pub mod reminder_scheduler;
pub mod stage_registry;
pub mod template;
pub mod workflow_engine;
pub mod workflow_tracker;

#[cfg(test)]
pub(crate) mod test_support;

pub use artifact_locks::ArtifactLocks;
pub use builtin_handlers::{NotificationHandler, TrackerHandler};
pub use event_bus::{EventBus, EventBusConfig, EventEnvelope, EventHandler, WorkflowEvent};
pub use notification_dispatcher::{DeliverySinks, Notification, NotificationDispatcher};
pub use observability::{CounterSnapshot, SideEffectCounters};
pub use reminder_scheduler::ReminderScheduler;
pub use stage_registry::StageRegistry;
pub use template::{TemplateData, TemplateRegistry};
pub use workflow_engine::{TransitionOutcome, WorkflowStateMachine, SYSTEM_ACTOR};
pub use workflow_tracker::WorkflowTracker;
