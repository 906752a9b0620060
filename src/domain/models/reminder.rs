//! Due-date reminders.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::Priority;

/// Whether a reminder fires before or after the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Approaching,
    Overdue,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approaching => "approaching",
            Self::Overdue => "overdue",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "approaching" => Some(Self::Approaching),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/// Lifecycle of a stored reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    Pending,
    /// Claimed by a tick, delivery in flight.
    Sending,
    Delivered,
}

impl ReminderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Delivered => "delivered",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sending" => Some(Self::Sending),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }
}

/// One offset relative to the due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderOffset {
    /// Negative before the due date, positive after it.
    pub days: i64,
    pub priority: Priority,
    pub template_id: String,
}

impl ReminderOffset {
    pub fn kind(&self) -> ReminderKind {
        if self.days > 0 {
            ReminderKind::Overdue
        } else {
            ReminderKind::Approaching
        }
    }
}

/// Offsets fired around a due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPlan {
    pub offsets: Vec<ReminderOffset>,
}

impl ReminderPlan {
    /// Build a plan from days-before and days-after lists.
    ///
    /// Priorities escalate as the due date gets closer and once it passes.
    pub fn from_days(approaching_days: &[i64], overdue_days: &[i64]) -> Self {
        let mut offsets = Vec::new();
        for &days in approaching_days {
            let priority = match days {
                d if d <= 1 => Priority::High,
                d if d <= 7 => Priority::Normal,
                _ => Priority::Low,
            };
            offsets.push(ReminderOffset {
                days: -days.abs(),
                priority,
                template_id: "deadline_approaching".to_string(),
            });
        }
        for &days in overdue_days {
            let priority = if days.abs() >= 7 { Priority::Urgent } else { Priority::High };
            offsets.push(ReminderOffset {
                days: days.abs().max(1),
                priority,
                template_id: "deadline_overdue".to_string(),
            });
        }
        offsets.sort_by_key(|o| o.days);
        Self { offsets }
    }

    /// Plan with every template swapped for `template_id`.
    pub fn with_template(mut self, template_id: &str) -> Self {
        for offset in &mut self.offsets {
            offset.template_id = template_id.to_string();
        }
        self
    }
}

impl Default for ReminderPlan {
    fn default() -> Self {
        Self::from_days(&[30, 14, 7, 1], &[1, 7])
    }
}

/// A reminder waiting to fire, or already fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub id: Uuid,
    pub artifact_id: Uuid,
    /// Stage that owns the due date.
    pub stage: String,
    pub due_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub kind: ReminderKind,
    /// 1-based position among reminders of the same kind.
    pub sequence: u32,
    pub total_expected: u32,
    pub days_offset: i64,
    pub priority: Priority,
    pub template_id: String,
    pub state: ReminderState,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl ScheduledReminder {
    /// Whole days between the due date and the fire time; positive when
    /// the reminder fires after the due date.
    pub fn days_past_due(&self) -> i64 {
        (self.fire_at - self.due_at).num_days()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == ReminderState::Pending && self.fire_at <= now
    }
}

/// Expand a plan into concrete reminders.
///
/// Approaching reminders whose fire time is already past at scheduling time
/// are dropped; overdue reminders are always kept.
pub fn expand_plan(
    artifact_id: Uuid,
    stage: &str,
    due_at: DateTime<Utc>,
    plan: &ReminderPlan,
    now: DateTime<Utc>,
) -> Vec<ScheduledReminder> {
    let mut kept: Vec<&ReminderOffset> = plan
        .offsets
        .iter()
        .filter(|o| o.kind() == ReminderKind::Overdue || due_at + Duration::days(o.days) > now)
        .collect();
    kept.sort_by_key(|o| o.days);

    let total = |kind: ReminderKind| {
        u32::try_from(kept.iter().filter(|o| o.kind() == kind).count()).unwrap_or(u32::MAX)
    };
    let approaching_total = total(ReminderKind::Approaching);
    let overdue_total = total(ReminderKind::Overdue);

    let mut approaching_seq = 0;
    let mut overdue_seq = 0;
    kept.into_iter()
        .map(|offset| {
            let kind = offset.kind();
            let (sequence, total_expected) = match kind {
                ReminderKind::Approaching => {
                    approaching_seq += 1;
                    (approaching_seq, approaching_total)
                }
                ReminderKind::Overdue => {
                    overdue_seq += 1;
                    (overdue_seq, overdue_total)
                }
            };
            ScheduledReminder {
                id: Uuid::new_v4(),
                artifact_id,
                stage: stage.to_string(),
                due_at,
                fire_at: due_at + Duration::days(offset.days),
                kind,
                sequence,
                total_expected,
                days_offset: offset.days,
                priority: offset.priority,
                template_id: offset.template_id.clone(),
                state: ReminderState::Pending,
                delivered_at: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_offsets() {
        let plan = ReminderPlan::default();
        let days: Vec<i64> = plan.offsets.iter().map(|o| o.days).collect();
        assert_eq!(days, vec![-30, -14, -7, -1, 1, 7]);
        assert_eq!(plan.offsets[0].kind(), ReminderKind::Approaching);
        assert_eq!(plan.offsets[5].kind(), ReminderKind::Overdue);
        assert_eq!(plan.offsets[5].priority, Priority::Urgent);
        assert_eq!(plan.offsets[3].priority, Priority::High);
    }

    #[test]
    fn test_expand_plan_sequences_per_kind() {
        let now = Utc::now();
        let due = now + Duration::days(60);
        let reminders = expand_plan(Uuid::new_v4(), "pta_review", due, &ReminderPlan::default(), now);

        assert_eq!(reminders.len(), 6);
        let approaching: Vec<_> = reminders.iter().filter(|r| r.kind == ReminderKind::Approaching).collect();
        assert_eq!(approaching.len(), 4);
        assert_eq!(approaching[0].sequence, 1);
        assert_eq!(approaching[3].sequence, 4);
        assert!(approaching.iter().all(|r| r.total_expected == 4));
        assert_eq!(approaching[0].fire_at, due - Duration::days(30));

        let overdue: Vec<_> = reminders.iter().filter(|r| r.kind == ReminderKind::Overdue).collect();
        assert_eq!(overdue.len(), 2);
        assert_eq!(overdue[1].sequence, 2);
        assert_eq!(overdue[1].days_past_due(), 7);
    }

    #[test]
    fn test_expand_plan_drops_stale_approaching() {
        let now = Utc::now();
        let due = now + Duration::days(10);
        let reminders = expand_plan(Uuid::new_v4(), "review", due, &ReminderPlan::default(), now);

        // 30 and 14 days before are already in the past
        let days: Vec<i64> = reminders.iter().map(|r| r.days_offset).collect();
        assert_eq!(days, vec![-7, -1, 1, 7]);
        assert!(reminders
            .iter()
            .filter(|r| r.kind == ReminderKind::Approaching)
            .all(|r| r.total_expected == 2));
    }
}
