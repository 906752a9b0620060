//! Side-effect failure and delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters for side effects that never fail the operation
/// that triggered them.
#[derive(Debug, Default)]
pub struct SideEffectCounters {
    notification_failures: AtomicU64,
    webhook_failures: AtomicU64,
    dependent_failures: AtomicU64,
    subscriber_failures: AtomicU64,
    sync_failures: AtomicU64,
    reminders_delivered: AtomicU64,
}

/// Point-in-time copy of [`SideEffectCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub notification_failures: u64,
    pub webhook_failures: u64,
    pub dependent_failures: u64,
    pub subscriber_failures: u64,
    pub sync_failures: u64,
    pub reminders_delivered: u64,
}

impl SideEffectCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single recipient on the email or dashboard channel failed.
    pub fn notification_failed(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_failed(&self) {
        self.webhook_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dependent_failed(&self) {
        self.dependent_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_failed(&self) {
        self.subscriber_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Store status or stage-mirror write failed after a transition.
    pub fn sync_failed(&self) {
        self.sync_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reminder_delivered(&self) {
        self.reminders_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            webhook_failures: self.webhook_failures.load(Ordering::Relaxed),
            dependent_failures: self.dependent_failures.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
            sync_failures: self.sync_failures.load(Ordering::Relaxed),
            reminders_delivered: self.reminders_delivered.load(Ordering::Relaxed),
        }
    }
}

impl CounterSnapshot {
    /// Total failed side effects of any kind.
    pub fn total_failures(&self) -> u64 {
        self.notification_failures
            + self.webhook_failures
            + self.dependent_failures
            + self.subscriber_failures
            + self.sync_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let counters = SideEffectCounters::new();
        counters.notification_failed();
        counters.notification_failed();
        counters.webhook_failed();
        counters.reminder_delivered();

        let snap = counters.snapshot();
        assert_eq!(snap.notification_failures, 2);
        assert_eq!(snap.webhook_failures, 1);
        assert_eq!(snap.reminders_delivered, 1);
        assert_eq!(snap.total_failures(), 3);
    }
}
