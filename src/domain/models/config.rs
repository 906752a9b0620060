use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration structure for privflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Notification delivery configuration
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Directory of known identities and their roles
    #[serde(default)]
    pub identities: Vec<IdentityConfig>,

    /// Workflow timing configuration
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Reminder plan configuration
    #[serde(default)]
    pub reminders: ReminderConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".privflow/privflow.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation policy for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Notification delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationConfig {
    /// Per-recipient delivery timeout in seconds
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    /// Directory with `<template_id>.txt` overrides
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    /// Chat webhook channel
    #[serde(default)]
    pub chat_webhook: ChatWebhookConfig,
}

const fn default_delivery_timeout_secs() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_secs: default_delivery_timeout_secs(),
            templates_dir: None,
            chat_webhook: ChatWebhookConfig::default(),
        }
    }
}

/// Chat webhook configuration. Disabled unless both `enabled` and `url` are
/// set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatWebhookConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub url: Option<String>,

    /// Display name attached to posted messages
    #[serde(default)]
    pub username: Option<String>,
}

impl ChatWebhookConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// A known identity and the roles it holds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IdentityConfig {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Workflow timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowConfig {
    /// Days an active collection runs before its periodic review is due
    #[serde(default = "default_periodic_review_days")]
    pub periodic_review_days: i64,

    /// Days past due after which an overdue reminder flags the stage blocked
    #[serde(default = "default_blocked_grace_days")]
    pub blocked_grace_days: i64,

    /// Interval between reminder ticks when running the scheduler loop
    #[serde(default = "default_reminder_tick_secs")]
    pub reminder_tick_secs: u64,

    /// Capacity of the outbound event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

const fn default_periodic_review_days() -> i64 {
    365
}

const fn default_blocked_grace_days() -> i64 {
    7
}

const fn default_reminder_tick_secs() -> u64 {
    300
}

const fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            periodic_review_days: default_periodic_review_days(),
            blocked_grace_days: default_blocked_grace_days(),
            reminder_tick_secs: default_reminder_tick_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Reminder plan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReminderConfig {
    /// Days before the due date to send approaching reminders
    #[serde(default = "default_approaching_days")]
    pub approaching_days: Vec<i64>,

    /// Days after the due date to send overdue reminders
    #[serde(default = "default_overdue_days")]
    pub overdue_days: Vec<i64>,
}

fn default_approaching_days() -> Vec<i64> {
    vec![30, 14, 7, 1]
}

fn default_overdue_days() -> Vec<i64> {
    vec![1, 7]
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            approaching_days: default_approaching_days(),
            overdue_days: default_overdue_days(),
        }
    }
}
