//! The document type persisted inside a bundle file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StorageError};
use crate::types::{DocumentId, FieldValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Vec<(String, FieldValue)>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(fields: Vec<(String, FieldValue)>) -> Self {
        let now = Utc::now();
        Self { id: DocumentId::new(), fields, created_at: now, updated_at: now }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Looks up a required field, returning `FieldMissing` when absent.
    pub fn require_field(&self, name: &str) -> Result<&FieldValue> {
        self.field(name).ok_or_else(|| StorageError::FieldMissing(name.to_string()))
    }

    pub fn to_bson(&self) -> bson::Document {
        let mut doc = bson::Document::new();
        doc.insert("_id", self.id.0.to_string());
        doc.insert("_created_at", bson::DateTime::from_chrono(self.created_at));
        doc.insert("_updated_at", bson::DateTime::from_chrono(self.updated_at));
        for (k, v) in &self.fields {
            doc.insert(k.clone(), v.to_bson());
        }
        doc
    }

    pub fn from_bson(mut doc: bson::Document) -> Result<Self> {
        let id = doc
            .remove("_id")
            .and_then(|v| v.as_str().map(str::to_string))
            .and_then(|s| uuid::Uuid::parse_str(&s).ok())
            .map(DocumentId)
            .ok_or_else(|| StorageError::FieldMissing("_id".to_string()))?;
        let created_at = doc
            .remove("_created_at")
            .and_then(|v| v.as_datetime().map(bson::DateTime::to_chrono))
            .unwrap_or_else(Utc::now);
        let updated_at = doc
            .remove("_updated_at")
            .and_then(|v| v.as_datetime().map(bson::DateTime::to_chrono))
            .unwrap_or(created_at);
        let fields = doc.into_iter().map(|(k, v)| (k, FieldValue::from_bson(&v))).collect();
        Ok(Self { id, fields, created_at, updated_at })
    }
}
