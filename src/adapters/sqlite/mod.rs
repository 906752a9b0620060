//! SQLite adapters for privflow.

pub mod artifact_store;
pub mod connection;
pub mod dashboard_store;
pub mod email_outbox;
pub mod migrations;
pub mod reminder_repository;
pub mod workflow_repository;

pub use artifact_store::SqliteArtifactStore;
pub use connection::{create_pool, create_test_pool, database_url, ConnectionError, PoolConfig};
pub use dashboard_store::SqliteDashboardStore;
pub use email_outbox::SqliteEmailOutbox;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use reminder_repository::SqliteReminderRepository;
pub use workflow_repository::SqliteWorkflowRepository;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::DatabaseConfig;

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an optional UUID string from a SQLite row field.
pub fn parse_optional_uuid(s: Option<String>) -> DomainResult<Option<Uuid>> {
    s.map(|s| parse_uuid(&s)).transpose()
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(&s)).transpose()
}

/// Parse a stored enum value through its `from_str`.
pub fn parse_enum<T>(s: &str, what: &str, parse: impl FnOnce(&str) -> Option<T>) -> DomainResult<T> {
    parse(s).ok_or_else(|| DomainError::SerializationError(format!("Unknown {what}: {s}")))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Open the configured database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(&database_url(&config.path), &PoolConfig::from(config)).await?;
    Migrator::new(pool.clone()).run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    Migrator::new(pool.clone()).run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
