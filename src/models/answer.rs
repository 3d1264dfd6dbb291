use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    /// Correct answers carry a positive score.
    pub score: i32,
}

#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub question_id: Uuid,
    pub text: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerContent {
    pub text: String,
    pub score: i32,
}

impl From<&Answer> for AnswerContent {
    fn from(answer: &Answer) -> Self {
        Self {
            text: answer.text.clone(),
            score: answer.score,
        }
    }
}
