use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::attempt_version::AttemptVersion;

/// Prefix marking `attempt_snapshot` as a pointer into object storage rather than content.
pub const SNAPSHOT_POINTER_PREFIX: &str = "objstore://";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TestAttempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub test_id: Uuid,
    /// Set on first completion only; part of the (student, test, date) uniqueness key.
    pub date_of_attempt: Option<NaiveDate>,
    pub point: Option<i32>,
    pub certificate_id: Option<Uuid>,
    pub attempt_version: Option<JsonValue>,
    pub version_revision: i64,
    pub attempt_snapshot: Option<String>,
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TestAttempt {
    pub fn snapshot_is_pointer(&self) -> bool {
        self.attempt_snapshot
            .as_deref()
            .map(|s| s.starts_with(SNAPSHOT_POINTER_PREFIX))
            .unwrap_or(false)
    }
}

/// The attempt-version document as stored, with the revision used for compare-and-set.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredVersion {
    pub document: Option<JsonValue>,
    pub revision: i64,
}

impl StoredVersion {
    /// Null, `{}` and blank strings all count as "not yet initialized".
    pub fn is_empty(&self) -> bool {
        match &self.document {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::Object(map)) => map.is_empty(),
            Some(JsonValue::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }

    /// Decodes the document. Empty documents are `None`; a document that exists but does not
    /// match the schema is an error so it never gets overwritten by accident.
    pub fn parse(&self) -> Result<Option<AttemptVersion>> {
        if self.is_empty() {
            return Ok(None);
        }
        let parsed = match &self.document {
            Some(JsonValue::String(raw)) => serde_json::from_str::<AttemptVersion>(raw),
            Some(value) => serde_json::from_value::<AttemptVersion>(value.clone()),
            None => return Ok(None),
        };
        parsed
            .map(Some)
            .map_err(|e| Error::Internal(format!("stored attempt version is unreadable: {}", e)))
    }
}
