//! SQLite implementation of the ArtifactStore.
//!
//! Stands in for the external content store: typed fields and opaque keys
//! are kept together in one JSON column.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_enum, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Artifact, ArtifactFields, ArtifactKind};
use crate::domain::ports::ArtifactStore;

#[derive(Clone)]
pub struct SqliteArtifactStore {
    pool: SqlitePool,
}

impl SqliteArtifactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn get(&self, id: Uuid) -> DomainResult<Option<Artifact>> {
        let row: Option<ArtifactRow> = sqlx::query_as(
            "SELECT id, kind, title, status, owner, fields, created_at, modified_at
             FROM artifacts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArtifactRow::try_into_artifact).transpose()
    }

    async fn create(&self, artifact: &Artifact) -> DomainResult<Uuid> {
        let fields_json = serde_json::to_string(&artifact.fields)?;

        sqlx::query(
            "INSERT INTO artifacts (id, kind, title, status, owner, fields, created_at, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(artifact.id.to_string())
        .bind(artifact.kind.as_str())
        .bind(&artifact.title)
        .bind(&artifact.status)
        .bind(&artifact.owner)
        .bind(fields_json)
        .bind(artifact.created_at.to_rfc3339())
        .bind(artifact.modified_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(artifact.id)
    }

    async fn update_field(&self, id: Uuid, key: &str, value: Value) -> DomainResult<()> {
        // Read-modify-write inside one transaction so concurrent field
        // updates on the same artifact do not drop each other.
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT fields FROM artifacts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let (fields_json,) = row.ok_or(DomainError::ArtifactNotFound(id))?;

        let mut fields: ArtifactFields = serde_json::from_str(&fields_json)?;
        fields.set(key, value)?;

        sqlx::query("UPDATE artifacts SET fields = ?, modified_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&fields)?)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE artifacts SET status = ?, modified_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ArtifactNotFound(id));
        }
        Ok(())
    }

    async fn list(&self, kind: Option<ArtifactKind>) -> DomainResult<Vec<Artifact>> {
        let rows: Vec<ArtifactRow> = match kind {
            Some(kind) => {
                sqlx::query_as(
                    "SELECT id, kind, title, status, owner, fields, created_at, modified_at
                     FROM artifacts WHERE kind = ? ORDER BY created_at DESC",
                )
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, kind, title, status, owner, fields, created_at, modified_at
                     FROM artifacts ORDER BY created_at DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(ArtifactRow::try_into_artifact).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ArtifactRow {
    id: String,
    kind: String,
    title: String,
    status: String,
    owner: Option<String>,
    fields: String,
    created_at: String,
    modified_at: String,
}

impl ArtifactRow {
    fn try_into_artifact(self) -> DomainResult<Artifact> {
        Ok(Artifact {
            id: parse_uuid(&self.id)?,
            kind: parse_enum(&self.kind, "artifact kind", ArtifactKind::from_str)?,
            title: self.title,
            status: self.status,
            owner: self.owner,
            fields: serde_json::from_str(&self.fields)?,
            created_at: parse_datetime(&self.created_at)?,
            modified_at: parse_datetime(&self.modified_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::field;
    use serde_json::json;

    async fn setup_store() -> SqliteArtifactStore {
        SqliteArtifactStore::new(create_migrated_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_and_get_artifact() {
        let store = setup_store().await;
        let artifact = Artifact::new(ArtifactKind::Collection, "Customer CRM").with_owner("olivia");

        let id = store.create(&artifact).await.unwrap();
        let loaded = store.get(id).await.unwrap().unwrap();

        assert_eq!(loaded.title, "Customer CRM");
        assert_eq!(loaded.kind, ArtifactKind::Collection);
        assert_eq!(loaded.status, "draft");
        assert_eq!(loaded.owner.as_deref(), Some("olivia"));
    }

    #[tokio::test]
    async fn test_update_field_keeps_other_fields() {
        let store = setup_store().await;
        let artifact = Artifact::new(ArtifactKind::Collection, "Payroll");
        let id = store.create(&artifact).await.unwrap();
        let pta = Uuid::new_v4();

        store.update_field(id, "retention", json!("7y")).await.unwrap();
        store.update_field(id, field::CURRENT_PTA, json!(pta)).await.unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.fields.current_pta, Some(pta));
        assert_eq!(loaded.fields.extra.get("retention"), Some(&json!("7y")));
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let store = setup_store().await;
        let id = Uuid::new_v4();

        assert!(store.get(id).await.unwrap().is_none());
        assert!(matches!(
            store.set_status(id, "publish").await,
            Err(DomainError::ArtifactNotFound(_))
        ));
        assert!(matches!(
            store.update_field(id, "x", json!(1)).await,
            Err(DomainError::ArtifactNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_kind() {
        let store = setup_store().await;
        store.create(&Artifact::new(ArtifactKind::Collection, "A")).await.unwrap();
        store.create(&Artifact::new(ArtifactKind::Threshold, "B")).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        let pta = store.list(Some(ArtifactKind::Threshold)).await.unwrap();
        assert_eq!(pta.len(), 1);
        assert_eq!(pta[0].title, "B");
    }
}
