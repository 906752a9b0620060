//! Artifact domain model.
//!
//! An artifact is a privacy-compliance document instance tracked by the
//! workflow. The content store owns most of its data; the engine only reads
//! the typed fields in [`ArtifactFields`] and passes everything else through.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Kind of privacy-compliance artifact. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A personal information collection.
    Collection,
    /// A privacy threshold assessment (PTA).
    Threshold,
    /// A privacy impact assessment (PIA).
    Impact,
    /// Any other tracked document.
    Document,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Collection,
        ArtifactKind::Threshold,
        ArtifactKind::Impact,
        ArtifactKind::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Threshold => "threshold",
            Self::Impact => "impact",
            Self::Document => "document",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "collection" => Some(Self::Collection),
            "threshold" | "pta" => Some(Self::Threshold),
            "impact" | "pia" => Some(Self::Impact),
            "document" => Some(Self::Document),
            _ => None,
        }
    }

    /// Human-readable name used in generated titles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Collection => "Collection",
            Self::Threshold => "Privacy Threshold Assessment",
            Self::Impact => "Privacy Impact Assessment",
            Self::Document => "Document",
        }
    }

    /// Parse a kind, failing with [`DomainError::UnknownKind`].
    pub fn parse(s: &str) -> DomainResult<Self> {
        Self::from_str(s).ok_or_else(|| DomainError::UnknownKind(s.to_string()))
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification categories a stakeholder can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    StatusChange,
    Documents,
    Comments,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "status_change",
            Self::Documents => "documents",
            Self::Comments => "comments",
        }
    }
}

/// A named party attached to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stakeholder {
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub categories: BTreeSet<NotificationCategory>,
}

impl Stakeholder {
    /// A stakeholder only hears about categories they subscribed to.
    pub fn subscribed_to(&self, category: NotificationCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Field keys the engine reads or writes.
pub mod field {
    pub const WORKFLOW_STAGE: &str = "workflow_stage";
    pub const CURRENT_PTA: &str = "current_pta";
    pub const CURRENT_PIA: &str = "current_pia";
    pub const PARENT_ID: &str = "parent_id";
    pub const DUE_DATES: &str = "due_dates";
    pub const STAKEHOLDERS: &str = "stakeholders";
}

/// Typed metadata attached to an artifact.
///
/// Keys listed in [`field`] map onto typed members; all other keys are kept
/// verbatim in `extra` and never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_pta: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_pia: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Explicit due dates keyed by stage id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub due_dates: BTreeMap<String, DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stakeholders: Vec<Stakeholder>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ArtifactFields {
    /// Set a single field from its JSON representation.
    ///
    /// A `null` value clears a typed field.
    pub fn set(&mut self, key: &str, value: Value) -> DomainResult<()> {
        fn typed<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> DomainResult<T> {
            serde_json::from_value(value).map_err(|e| {
                DomainError::ValidationFailed(format!("invalid value for field '{key}': {e}"))
            })
        }

        match key {
            field::WORKFLOW_STAGE => self.workflow_stage = typed(key, value)?,
            field::CURRENT_PTA => self.current_pta = typed(key, value)?,
            field::CURRENT_PIA => self.current_pia = typed(key, value)?,
            field::PARENT_ID => self.parent_id = typed(key, value)?,
            field::DUE_DATES => {
                self.due_dates = typed::<Option<_>>(key, value)?.unwrap_or_default();
            }
            field::STAKEHOLDERS => {
                self.stakeholders = typed::<Option<_>>(key, value)?.unwrap_or_default();
            }
            _ => {
                if value.is_null() {
                    self.extra.remove(key);
                } else {
                    self.extra.insert(key.to_string(), value);
                }
            }
        }
        Ok(())
    }

    /// Artifact referenced by a link field, if set.
    pub fn linked(&self, key: &str) -> Option<Uuid> {
        match key {
            field::CURRENT_PTA => self.current_pta,
            field::CURRENT_PIA => self.current_pia,
            field::PARENT_ID => self.parent_id,
            _ => self
                .extra
                .get(key)
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
        }
    }

    /// Explicit due date recorded for a stage, if any.
    pub fn due_date_for(&self, stage: &str) -> Option<DateTime<Utc>> {
        self.due_dates.get(stage).copied()
    }
}

/// A privacy-compliance document instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub kind: ArtifactKind,
    pub title: String,
    /// Free-form content-store status (draft, pending, publish, ...).
    pub status: String,
    /// Identity reference of the owner.
    pub owner: Option<String>,
    #[serde(default)]
    pub fields: ArtifactFields,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            status: "draft".to_string(),
            owner: None,
            fields: ArtifactFields::default(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_fields(mut self, fields: ArtifactFields) -> Self {
        self.fields = fields;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parsing() {
        assert_eq!(ArtifactKind::from_str("Collection"), Some(ArtifactKind::Collection));
        assert_eq!(ArtifactKind::from_str("pta"), Some(ArtifactKind::Threshold));
        assert_eq!(ArtifactKind::from_str("pia"), Some(ArtifactKind::Impact));
        assert!(ArtifactKind::from_str("spreadsheet").is_none());
        assert!(matches!(
            ArtifactKind::parse("spreadsheet"),
            Err(DomainError::UnknownKind(k)) if k == "spreadsheet"
        ));
    }

    #[test]
    fn test_set_typed_and_opaque_fields() {
        let mut fields = ArtifactFields::default();
        let pta = Uuid::new_v4();

        fields.set(field::CURRENT_PTA, json!(pta.to_string())).unwrap();
        fields.set("retention_notes", json!("keep for 7 years")).unwrap();

        assert_eq!(fields.current_pta, Some(pta));
        assert_eq!(fields.extra.get("retention_notes"), Some(&json!("keep for 7 years")));

        assert_eq!(fields.linked(field::CURRENT_PTA), Some(pta));
        fields.set(field::CURRENT_PTA, Value::Null).unwrap();
        assert!(fields.current_pta.is_none());
    }

    #[test]
    fn test_set_rejects_malformed_typed_field() {
        let mut fields = ArtifactFields::default();
        let err = fields.set(field::CURRENT_PIA, json!(42)).unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[test]
    fn test_fields_serde_keeps_extra_keys_flat() {
        let raw = json!({
            "current_pta": Uuid::nil().to_string(),
            "board_column": "review",
            "stakeholders": [{
                "name": "Dana",
                "email": "dana@example.org",
                "role": "analyst",
                "categories": ["status_change"]
            }]
        });
        let fields: ArtifactFields = serde_json::from_value(raw).unwrap();
        assert_eq!(fields.current_pta, Some(Uuid::nil()));
        assert_eq!(fields.extra.get("board_column"), Some(&json!("review")));
        assert!(fields.stakeholders[0].subscribed_to(NotificationCategory::StatusChange));
        assert!(!fields.stakeholders[0].subscribed_to(NotificationCategory::Comments));

        let back = serde_json::to_value(&fields).unwrap();
        assert_eq!(back["board_column"], json!("review"));
    }
}
