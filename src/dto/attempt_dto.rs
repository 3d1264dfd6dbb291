use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::models::attempt_version::{AnswerSelection, QuestionInit};
use crate::services::answer_service::{QuestionDetails, RecordOutcome};
use crate::services::snapshot_service::SnapshotLocation;
use crate::storage::SnapshotMetadata;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAttemptRequest {
    pub student_id: Uuid,
    pub test_id: Uuid,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitVersionRequest {
    #[validate(range(min = 0))]
    pub attempt_no: i32,
    #[serde(default)]
    pub questions: Vec<QuestionInit>,
    pub test_title: Option<String>,
    pub min_point: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveAnswersRequest {
    pub question_id: Uuid,
    #[validate(length(max = 100))]
    pub answer_ids: Vec<Uuid>,
    #[serde(default)]
    pub answer_points: Vec<i32>,
    #[serde(default)]
    pub earned_points: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveAnswersResponse {
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertAnswersRequest {
    pub question_id: Uuid,
    pub question_text: Option<String>,
    pub max_points: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub answer_ids: Vec<Uuid>,
    #[serde(default)]
    pub answer_texts: Vec<String>,
    #[serde(default)]
    pub answer_points: Vec<i32>,
    #[serde(default)]
    pub earned_points: i32,
}

impl UpsertAnswersRequest {
    pub fn into_parts(self) -> (Uuid, QuestionDetails, AnswerSelection) {
        (
            self.question_id,
            QuestionDetails {
                question_text: self.question_text,
                max_points: self.max_points,
            },
            AnswerSelection {
                answer_ids: self.answer_ids,
                answer_texts: self.answer_texts,
                answer_points: self.answer_points,
                earned_points: self.earned_points,
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteAttemptRequest {
    pub total_points: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveSnapshotRequest {
    /// Either a JSON document or an already serialized string.
    pub snapshot: JsonValue,
    pub date: Option<NaiveDate>,
    pub attempt_version: Option<JsonValue>,
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

impl SaveSnapshotRequest {
    pub fn content(&self) -> String {
        as_text(&self.snapshot)
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata {
            date: self.date,
            attempt_version: self.attempt_version.as_ref().map(as_text),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveSnapshotResponse {
    pub attempt_id: Uuid,
    pub location: SnapshotLocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotResponse {
    pub attempt_id: Uuid,
    pub snapshot: Option<JsonValue>,
}

impl SnapshotResponse {
    /// JSON content is returned as a document, anything else as a string.
    pub fn new(attempt_id: Uuid, content: Option<String>) -> Self {
        let snapshot = content.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw))
        });
        Self {
            attempt_id,
            snapshot,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotListResponse {
    pub attempt_ids: Vec<Uuid>,
}
