use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Project-local configuration directory.
pub const CONFIG_DIR: &str = ".privflow";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid delivery_timeout_secs: {0}. Must be at least 1")]
    InvalidDeliveryTimeout(u64),

    #[error("Chat webhook is enabled but has no url")]
    MissingWebhookUrl,

    #[error("Invalid {field}: {value}. Must be positive")]
    NonPositive { field: &'static str, value: i64 },

    #[error("Duplicate identity id: {0}")]
    DuplicateIdentity(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .privflow/config.yaml (project config, created by init)
    /// 3. .privflow/local.yaml (local overrides, optional)
    /// 4. Environment variables (PRIVFLOW_* prefix, `__` between sections)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new(CONFIG_DIR))
    }

    /// [`load`](Self::load) with the config directory at `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("PRIVFLOW_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !["json", "pretty"].contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        if !["daily", "hourly", "never"].contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let notifications = &config.notifications;
        if notifications.delivery_timeout_secs == 0 {
            return Err(ConfigError::InvalidDeliveryTimeout(notifications.delivery_timeout_secs));
        }
        if notifications.chat_webhook.enabled && notifications.chat_webhook.url.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingWebhookUrl);
        }

        let workflow = &config.workflow;
        for (field, value) in [
            ("workflow.periodic_review_days", workflow.periodic_review_days),
            ("workflow.blocked_grace_days", workflow.blocked_grace_days),
            ("workflow.reminder_tick_secs", workflow.reminder_tick_secs as i64),
            ("workflow.event_channel_capacity", workflow.event_channel_capacity as i64),
        ] {
            if value <= 0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        for &days in config.reminders.approaching_days.iter().chain(&config.reminders.overdue_days) {
            if days <= 0 {
                return Err(ConfigError::NonPositive {
                    field: "reminders offset",
                    value: days,
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for identity in &config.identities {
            if identity.id.is_empty() {
                return Err(ConfigError::ValidationFailed("identity id cannot be empty".to_string()));
            }
            if !identity.email.contains('@') {
                return Err(ConfigError::ValidationFailed(format!(
                    "identity '{}' has an invalid email address",
                    identity.id
                )));
            }
            if !seen.insert(identity.id.as_str()) {
                return Err(ConfigError::DuplicateIdentity(identity.id.clone()));
            }
        }

        Ok(())
    }

    /// YAML written by `privflow init`.
    pub fn default_yaml() -> Result<String> {
        serde_yaml::to_string(&Config::default()).context("Failed to serialize default configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::IdentityConfig;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".privflow/privflow.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.workflow.periodic_review_days, 365);
        assert_eq!(config.reminders.approaching_days, vec![30, 14, 7, 1]);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 5
logging:
  level: debug
  format: json
notifications:
  delivery_timeout_secs: 3
  chat_webhook:
    enabled: true
    url: https://chat.example.org/hooks/abc
identities:
  - id: olivia
    email: olivia@example.org
    roles: [privacy_officer]
workflow:
  blocked_grace_days: 3
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.format, "json");
        assert!(config.notifications.chat_webhook.is_active());
        assert_eq!(config.identities[0].roles, vec!["privacy_officer".to_string()]);
        assert_eq!(config.workflow.blocked_grace_days, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.workflow.periodic_review_days, 365);
        assert_eq!(config.reminders.overdue_days, vec![1, 7]);
        ConfigLoader::validate(&config).unwrap();
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));
    }

    #[test]
    fn test_validate_webhook_without_url() {
        let mut config = Config::default();
        config.notifications.chat_webhook.enabled = true;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::MissingWebhookUrl)));
    }

    #[test]
    fn test_validate_non_positive_values() {
        let mut config = Config::default();
        config.workflow.blocked_grace_days = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NonPositive { field: "workflow.blocked_grace_days", .. })
        ));

        let mut config = Config::default();
        config.reminders.overdue_days = vec![1, -7];
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_identity() {
        let mut config = Config::default();
        let identity = IdentityConfig {
            id: "olivia".to_string(),
            email: "olivia@example.org".to_string(),
            display_name: None,
            roles: vec![],
        };
        config.identities = vec![identity.clone(), identity];
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::DuplicateIdentity(_))));
    }

    #[test]
    fn test_default_yaml_round_trips() {
        let yaml = ConfigLoader::default_yaml().unwrap();
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        ConfigLoader::validate(&config).unwrap();
    }
}
