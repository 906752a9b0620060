//! Derived progress and metrics views. Never stored; recomputed from the
//! stage history and current state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageProgressStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StageProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }
}

/// One entry in the stage timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub stage: String,
    pub title: String,
    pub entered_at: DateTime<Utc>,
    /// `None` while the stage is current.
    pub exited_at: Option<DateTime<Utc>>,
    pub actor: String,
}

/// Snapshot of an artifact's progress through its workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub artifact_id: Uuid,
    pub current_stage: String,
    /// Completed stage ids in order of first completion.
    pub completed_stages: Vec<String>,
    pub stage_status: BTreeMap<String, StageProgressStatus>,
    /// 0–100, one decimal.
    pub completion_percentage: f64,
    pub started_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub is_blocked: bool,
    pub timeline: Vec<TimelineEntry>,
}

/// Velocity and duration metrics for an artifact's workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub artifact_id: Uuid,
    pub days_in_workflow: i64,
    pub days_in_current_stage: i64,
    /// Mean days spent in completed stages, one decimal.
    pub average_stage_duration: f64,
    /// Completed fraction per day in the workflow; 0 on the first day.
    pub completion_rate: f64,
    pub blocking_incident_count: usize,
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round1() {
        assert!((round1(35.0) - 35.0).abs() < f64::EPSILON);
        assert!((round1(33.333_333) - 33.3).abs() < 1e-9);
        assert!((round1(66.666_666) - 66.7).abs() < 1e-9);
    }
}
