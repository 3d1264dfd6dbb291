//! Persistence seams. Services only ever talk to these traits; the Postgres and in-memory
//! implementations live next to them.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::{Answer, NewAnswer};
use crate::models::draft::{Draft, DraftInsert, NewDraft};
use crate::models::question::{NewQuestion, Question, QuestionContent, QuestionOwner, QuestionWithAnswers};
use crate::models::test::{ContentHeader, Test};
use crate::models::test_attempt::{StoredVersion, TestAttempt};

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Inserts the test together with its questions and answers, all or nothing.
    async fn create_test(&self, header: &ContentHeader, content: &[QuestionContent]) -> Result<Test>;
    async fn get_test(&self, id: Uuid) -> Result<Test>;
    async fn update_test(&self, id: Uuid, header: &ContentHeader) -> Result<Test>;
    /// Removes the test and the questions it owns. Drafts that pointed at it lose the link.
    async fn delete_test(&self, id: Uuid) -> Result<()>;

    async fn get_draft(&self, id: Uuid) -> Result<Draft>;
    async fn find_draft_by_test_id(&self, test_id: Uuid) -> Result<Option<Draft>>;
    async fn list_drafts(&self, course_id: Option<Uuid>) -> Result<Vec<Draft>>;
    /// Inserts a draft together with its content. When `draft.test_id` already has a draft,
    /// nothing is written and the existing one is returned.
    async fn insert_draft(&self, draft: &NewDraft, content: &[QuestionContent]) -> Result<DraftInsert>;
    /// Overwrites the draft header and replaces all of its questions and answers.
    async fn update_draft(
        &self,
        id: Uuid,
        header: &ContentHeader,
        content: &[QuestionContent],
    ) -> Result<Draft>;
    async fn delete_draft(&self, id: Uuid) -> Result<()>;
    /// Writes `content` into the draft's target test (creating the test when the draft has
    /// none), then deletes the draft. Either everything happens or nothing does.
    async fn publish(&self, draft: &Draft, content: &[QuestionContent]) -> Result<Test>;

    async fn create_question(&self, question: &NewQuestion) -> Result<Question>;
    /// Deletes the question and its answers.
    async fn delete_question(&self, id: Uuid) -> Result<()>;
    async fn questions_by_test(&self, test_id: Uuid) -> Result<Vec<Question>>;
    async fn questions_by_draft(&self, draft_id: Uuid) -> Result<Vec<Question>>;
    async fn create_answer(&self, answer: &NewAnswer) -> Result<Answer>;
    async fn delete_answer(&self, id: Uuid) -> Result<()>;
    async fn answers_by_question(&self, question_id: Uuid) -> Result<Vec<Answer>>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn create_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<TestAttempt>;
    async fn get_attempt(&self, id: Uuid) -> Result<TestAttempt>;
    async fn list_attempts(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<TestAttempt>>;
    async fn count_completed(&self, student_id: Uuid, test_id: Uuid) -> Result<i64>;

    async fn load_version(&self, id: Uuid) -> Result<StoredVersion>;
    /// Stores `document` only if the revision is still `expected_revision`, bumping it.
    /// Returns `false` when another writer got there first.
    async fn compare_and_set_version(
        &self,
        id: Uuid,
        expected_revision: i64,
        document: &JsonValue,
    ) -> Result<bool>;

    /// Marks the attempt completed. `date` is only written when no date is set yet.
    async fn complete(&self, id: Uuid, point: i32, date: NaiveDate) -> Result<TestAttempt>;
    async fn set_snapshot(&self, id: Uuid, snapshot: &str) -> Result<()>;
    async fn snapshot_attempt_ids(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>>;
    async fn delete_attempt(&self, id: Uuid) -> Result<()>;
}

/// Reads every question of `owner` with its answers, in display order.
pub async fn load_content(
    store: &dyn ContentStore,
    owner: &QuestionOwner,
) -> Result<Vec<QuestionWithAnswers>> {
    let questions = match owner {
        QuestionOwner::Test { test_id } => store.questions_by_test(*test_id).await?,
        QuestionOwner::Draft { draft_id, .. } => store.questions_by_draft(*draft_id).await?,
    };

    let mut out = Vec::with_capacity(questions.len());
    for question in questions {
        let answers = store.answers_by_question(question.id).await?;
        out.push(QuestionWithAnswers { question, answers });
    }
    Ok(out)
}
