use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerContent};

/// Who a question belongs to. Draft questions may remember the test they were copied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionOwner {
    Test {
        test_id: Uuid,
    },
    Draft {
        draft_id: Uuid,
        source_test_id: Option<Uuid>,
    },
}

impl QuestionOwner {
    pub fn kind(&self) -> &'static str {
        match self {
            QuestionOwner::Test { .. } => "test",
            QuestionOwner::Draft { .. } => "draft",
        }
    }

    pub fn test_id(&self) -> Option<Uuid> {
        match *self {
            QuestionOwner::Test { test_id } => Some(test_id),
            QuestionOwner::Draft { source_test_id, .. } => source_test_id,
        }
    }

    pub fn draft_id(&self) -> Option<Uuid> {
        match *self {
            QuestionOwner::Test { .. } => None,
            QuestionOwner::Draft { draft_id, .. } => Some(draft_id),
        }
    }

    /// Whether this owner is the same entity as `other`, ignoring draft lineage.
    pub fn same_owner(&self, other: &QuestionOwner) -> bool {
        match (self, other) {
            (QuestionOwner::Test { test_id: a }, QuestionOwner::Test { test_id: b }) => a == b,
            (
                QuestionOwner::Draft { draft_id: a, .. },
                QuestionOwner::Draft { draft_id: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub owner: QuestionOwner,
    pub text_of_question: String,
    pub order: i32,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub owner: QuestionOwner,
    pub text_of_question: String,
    pub order: i32,
}

/// Row shape of the `questions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub owner_kind: String,
    pub test_id: Option<Uuid>,
    pub draft_id: Option<Uuid>,
    pub text_of_question: String,
    pub order_index: i32,
}

impl TryFrom<QuestionRow> for Question {
    type Error = Error;

    fn try_from(row: QuestionRow) -> Result<Self> {
        let owner = match (row.owner_kind.as_str(), row.test_id, row.draft_id) {
            ("test", Some(test_id), _) => QuestionOwner::Test { test_id },
            ("draft", test_id, Some(draft_id)) => QuestionOwner::Draft {
                draft_id,
                source_test_id: test_id,
            },
            (kind, _, _) => {
                return Err(Error::Internal(format!(
                    "question {} has inconsistent owner ({})",
                    row.id, kind
                )))
            }
        };
        Ok(Question {
            id: row.id,
            owner,
            text_of_question: row.text_of_question,
            order: row.order_index,
        })
    }
}

/// Id-free question content, the unit copied between drafts and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionContent {
    pub text_of_question: String,
    pub order: i32,
    pub answers: Vec<AnswerContent>,
}

impl QuestionContent {
    /// Highest score a student can earn on this question: the sum of positive answer scores.
    /// Saturates at `i32::MAX`.
    pub fn max_points(&self) -> i32 {
        self.answers
            .iter()
            .fold(0i32, |acc, a| acc.saturating_add(a.score.max(0)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionWithAnswers {
    #[serde(flatten)]
    pub question: Question,
    pub answers: Vec<Answer>,
}

impl QuestionWithAnswers {
    pub fn to_content(&self) -> QuestionContent {
        QuestionContent {
            text_of_question: self.question.text_of_question.clone(),
            order: self.question.order,
            answers: self.answers.iter().map(AnswerContent::from).collect(),
        }
    }

    pub fn max_points(&self) -> i32 {
        self.answers
            .iter()
            .fold(0i32, |acc, a| acc.saturating_add(a.score.max(0)))
    }
}
