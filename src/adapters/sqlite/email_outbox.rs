//! Email transport that queues messages in the `email_outbox` table.
//!
//! An external relay picks rows up and sets `sent_at`.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::EmailMessage;
use crate::domain::ports::EmailTransport;

#[derive(Clone)]
pub struct SqliteEmailOutbox {
    pool: SqlitePool,
}

impl SqliteEmailOutbox {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of messages not yet picked up by the relay.
    pub async fn pending_count(&self) -> DomainResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM email_outbox WHERE sent_at IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl EmailTransport for SqliteEmailOutbox {
    async fn send(&self, message: &EmailMessage) -> DomainResult<()> {
        if !message.to.contains('@') {
            return Err(DomainError::DeliveryFailed(format!("invalid address '{}'", message.to)));
        }

        sqlx::query(
            "INSERT INTO email_outbox (id, recipient, subject, body, template_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(&message.to)
        .bind(&message.subject)
        .bind(&message.body)
        .bind(&message.template_id)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
