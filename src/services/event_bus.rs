//! Typed in-process event bus.
//!
//! Events are delivered two ways: awaited, in-line dispatch to registered
//! handlers (tracker, notifications), and a broadcast channel for external
//! observers. Handlers may react with follow-up events, which are processed
//! breadth-first up to a maximum chain depth. A handler error is logged and
//! counted; it never reaches the publisher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::domain::models::{ArtifactKind, WorkflowProgress};
use crate::services::observability::SideEffectCounters;

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound workflow events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A transition was committed. Carries a full snapshot so consumers never
    /// re-read state that may have moved on.
    StageChanged {
        artifact_id: Uuid,
        kind: ArtifactKind,
        title: String,
        old_stage: Option<String>,
        new_stage: String,
        actor: String,
        comment: Option<String>,
    },
    DependentCreated {
        parent_id: Uuid,
        parent_title: String,
        dependent_id: Uuid,
        dependent_kind: ArtifactKind,
        actor: String,
    },
    ProgressUpdated {
        artifact_id: Uuid,
        progress: WorkflowProgress,
    },
    BlockedChanged {
        artifact_id: Uuid,
        stage: String,
        blocked: bool,
        actor: String,
        reason: Option<String>,
    },
}

impl WorkflowEvent {
    /// Stable name used for handler filters and logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageChanged { .. } => "workflow.stage_changed",
            Self::DependentCreated { .. } => "workflow.dependent_created",
            Self::ProgressUpdated { .. } => "workflow.progress_updated",
            Self::BlockedChanged { .. } => "workflow.blocked_changed",
        }
    }

    /// Artifact the event is about.
    pub fn artifact_id(&self) -> Uuid {
        match self {
            Self::StageChanged { artifact_id, .. }
            | Self::ProgressUpdated { artifact_id, .. }
            | Self::BlockedChanged { artifact_id, .. } => *artifact_id,
            Self::DependentCreated { parent_id, .. } => *parent_id,
        }
    }
}

/// Event envelope with bus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    /// Shared by an event and every reaction it caused.
    pub correlation_id: Uuid,
    /// 0 for published events, +1 per reaction hop.
    pub chain_depth: u32,
    pub payload: WorkflowEvent,
}

/// What a handler can produce as a reaction.
pub enum Reaction {
    /// Publish follow-up events.
    EmitEvents(Vec<WorkflowEvent>),
    None,
}

/// Metadata describing a handler.
pub struct HandlerMetadata {
    pub name: &'static str,
    /// Event types the handler receives; empty means all.
    pub event_types: Vec<&'static str>,
}

impl HandlerMetadata {
    fn accepts(&self, event: &WorkflowEvent) -> bool {
        self.event_types.is_empty() || self.event_types.contains(&event.event_type())
    }
}

/// A named event subscriber.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn metadata(&self) -> HandlerMetadata;

    async fn handle(&self, event: &EventEnvelope) -> Result<Reaction, String>;
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub channel_capacity: usize,
    pub max_chain_depth: u32,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            max_chain_depth: 4,
        }
    }
}

pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: AtomicU64,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    counters: Arc<SideEffectCounters>,
    config: EventBusConfig,
}

impl EventBus {
    pub fn new(config: EventBusConfig, counters: Arc<SideEffectCounters>) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
            handlers: RwLock::new(Vec::new()),
            counters,
            config,
        }
    }

    /// Register a handler. Handlers run in registration order.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let name = handler.metadata().name;
        self.handlers.write().await.push(handler);
        tracing::debug!(handler = name, "registered event handler");
    }

    pub async fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.read().await.iter().map(|h| h.metadata().name).collect()
    }

    /// Subscribe to the outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Publish an event and run every matching handler, including the
    /// reactions they produce. Returns once the whole chain has settled.
    pub async fn publish(&self, event: WorkflowEvent) {
        let correlation_id = Uuid::new_v4();
        let handlers: Vec<Arc<dyn EventHandler>> = self.handlers.read().await.clone();

        let mut queue = VecDeque::from([(event, 0u32)]);
        while let Some((payload, chain_depth)) = queue.pop_front() {
            let envelope = EventEnvelope {
                id: Uuid::new_v4(),
                sequence: SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst)),
                timestamp: Utc::now(),
                correlation_id,
                chain_depth,
                payload,
            };

            for handler in &handlers {
                let meta = handler.metadata();
                if !meta.accepts(&envelope.payload) {
                    continue;
                }

                match handler.handle(&envelope).await {
                    Ok(Reaction::EmitEvents(events)) => {
                        if chain_depth + 1 > self.config.max_chain_depth {
                            tracing::warn!(
                                handler = meta.name,
                                event_type = envelope.payload.event_type(),
                                chain_depth,
                                "dropping reaction events beyond max chain depth"
                            );
                            continue;
                        }
                        queue.extend(events.into_iter().map(|e| (e, chain_depth + 1)));
                    }
                    Ok(Reaction::None) => {}
                    Err(error) => {
                        self.counters.subscriber_failed();
                        tracing::warn!(
                            handler = meta.name,
                            event_type = envelope.payload.event_type(),
                            artifact_id = %envelope.payload.artifact_id(),
                            error = %error,
                            "event handler failed"
                        );
                    }
                }
            }

            // No receivers is normal
            let _ = self.sender.send(envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn stage_changed(artifact_id: Uuid) -> WorkflowEvent {
        WorkflowEvent::StageChanged {
            artifact_id,
            kind: ArtifactKind::Collection,
            title: "CRM".to_string(),
            old_stage: Some("draft".to_string()),
            new_stage: "pta_required".to_string(),
            actor: "olivia".to_string(),
            comment: None,
        }
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata {
                name: "failing",
                event_types: vec![],
            }
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<Reaction, String> {
            Err("boom".to_string())
        }
    }

    struct Counting {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for Counting {
        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata {
                name: "counting",
                event_types: vec!["workflow.stage_changed"],
            }
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<Reaction, String> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(Reaction::None)
        }
    }

    /// Re-emits every event it sees.
    struct Echo;

    #[async_trait]
    impl EventHandler for Echo {
        fn metadata(&self) -> HandlerMetadata {
            HandlerMetadata {
                name: "echo",
                event_types: vec![],
            }
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<Reaction, String> {
            Ok(Reaction::EmitEvents(vec![event.payload.clone()]))
        }
    }

    #[tokio::test]
    async fn test_handler_failure_is_isolated_and_counted() {
        let counters = Arc::new(SideEffectCounters::new());
        let bus = EventBus::new(EventBusConfig::default(), counters.clone());
        let counting = Arc::new(Counting { seen: AtomicUsize::new(0) });
        bus.register(Arc::new(Failing)).await;
        bus.register(counting.clone()).await;

        bus.publish(stage_changed(Uuid::new_v4())).await;

        assert_eq!(counting.seen.load(Ordering::SeqCst), 1);
        assert_eq!(counters.snapshot().subscriber_failures, 1);
        assert_eq!(bus.handler_names().await, vec!["failing", "counting"]);
    }

    #[tokio::test]
    async fn test_reaction_chain_is_bounded() {
        let counters = Arc::new(SideEffectCounters::new());
        let bus = EventBus::new(
            EventBusConfig {
                channel_capacity: 16,
                max_chain_depth: 3,
            },
            counters,
        );
        bus.register(Arc::new(Echo)).await;
        let mut rx = bus.subscribe();

        bus.publish(stage_changed(Uuid::new_v4())).await;

        // The original plus three reaction hops
        let mut depths = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            depths.push(envelope.chain_depth);
        }
        assert_eq!(depths, vec![0, 1, 2, 3]);
        assert_eq!(bus.current_sequence(), SequenceNumber(4));
    }

    #[tokio::test]
    async fn test_filter_skips_other_event_types() {
        let bus = EventBus::new(EventBusConfig::default(), Arc::new(SideEffectCounters::new()));
        let counting = Arc::new(Counting { seen: AtomicUsize::new(0) });
        bus.register(counting.clone()).await;

        bus.publish(WorkflowEvent::BlockedChanged {
            artifact_id: Uuid::new_v4(),
            stage: "draft".to_string(),
            blocked: true,
            actor: "system".to_string(),
            reason: None,
        })
        .await;

        assert_eq!(counting.seen.load(Ordering::SeqCst), 0);
    }
}
