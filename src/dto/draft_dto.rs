use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::AnswerContent;
use crate::models::question::QuestionContent;
use crate::models::test::ContentHeader;
use crate::services::draft_service::DraftInput;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerPayload {
    #[validate(length(max = 2000))]
    pub text: String,
    #[serde(default)]
    #[validate(range(min = 0, max = 10000))]
    pub score: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionPayload {
    #[validate(length(max = 4000))]
    pub text_of_question: String,
    /// Defaults to the question's position in the submitted list, starting at 1.
    pub order: Option<i32>,
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<AnswerPayload>,
}

fn to_content(questions: Vec<QuestionPayload>) -> Vec<QuestionContent> {
    questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| QuestionContent {
            text_of_question: q.text_of_question,
            order: q.order.unwrap_or(i as i32 + 1),
            answers: q
                .answers
                .into_iter()
                .map(|a| AnswerContent {
                    text: a.text,
                    score: a.score,
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveDraftRequest {
    pub draft_id: Option<Uuid>,
    pub test_id: Option<Uuid>,
    pub course_id: Uuid,
    #[validate(length(max = 500))]
    pub title: String,
    #[serde(default)]
    pub min_point: i32,
    pub description: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionPayload>,
}

impl SaveDraftRequest {
    pub fn into_input(self) -> DraftInput {
        DraftInput {
            draft_id: self.draft_id,
            test_id: self.test_id,
            header: ContentHeader {
                course_id: self.course_id,
                title: self.title,
                min_point: self.min_point,
                description: self.description,
            },
            questions: to_content(self.questions),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTestRequest {
    pub course_id: Uuid,
    #[validate(length(max = 500))]
    pub title: String,
    #[serde(default)]
    pub min_point: i32,
    pub description: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionPayload>,
}

impl CreateTestRequest {
    pub fn into_parts(self) -> (ContentHeader, Vec<QuestionContent>) {
        (
            ContentHeader {
                course_id: self.course_id,
                title: self.title,
                min_point: self.min_point,
                description: self.description,
            },
            to_content(self.questions),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateTestRequest {
    pub course_id: Uuid,
    #[validate(length(max = 500))]
    pub title: String,
    #[serde(default)]
    pub min_point: i32,
    pub description: Option<String>,
}

impl UpdateTestRequest {
    pub fn into_header(self) -> ContentHeader {
        ContentHeader {
            course_id: self.course_id,
            title: self.title,
            min_point: self.min_point,
            description: self.description,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDraftsQuery {
    pub course_id: Option<Uuid>,
}
