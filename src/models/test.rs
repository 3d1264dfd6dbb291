use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Published, student-facing quiz content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Test {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub min_point: i32,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The editable header shared by tests and drafts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHeader {
    pub course_id: Uuid,
    pub title: String,
    pub min_point: i32,
    pub description: Option<String>,
}

impl From<&Test> for ContentHeader {
    fn from(test: &Test) -> Self {
        Self {
            course_id: test.course_id,
            title: test.title.clone(),
            min_point: test.min_point,
            description: test.description.clone(),
        }
    }
}
