use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::test::ContentHeader;

/// An editable working copy of a test. `test_id` is `None` until the draft has been
/// published for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Draft {
    pub id: Uuid,
    pub test_id: Option<Uuid>,
    pub course_id: Uuid,
    pub title: String,
    pub min_point: i32,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Draft {
    pub fn header(&self) -> ContentHeader {
        ContentHeader {
            course_id: self.course_id,
            title: self.title.clone(),
            min_point: self.min_point,
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewDraft {
    pub test_id: Option<Uuid>,
    pub header: ContentHeader,
}

/// Result of inserting a draft: a concurrent creator for the same test may already hold
/// the slot, in which case the existing draft is returned untouched.
#[derive(Debug, Clone)]
pub enum DraftInsert {
    Created(Draft),
    Existing(Draft),
}

impl DraftInsert {
    pub fn into_draft(self) -> Draft {
        match self {
            DraftInsert::Created(d) | DraftInsert::Existing(d) => d,
        }
    }
}
