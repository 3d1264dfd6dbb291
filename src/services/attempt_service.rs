use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{load_content, AttemptStore, ContentStore};
use crate::error::{Error, Result};
use crate::models::attempt_version::{AttemptVersion, QuestionInit};
use crate::models::question::QuestionOwner;
use crate::models::test_attempt::TestAttempt;
use crate::utils::time::today;

/// Read-modify-write attempts on the version document before giving up with `Conflict`.
pub const MAX_VERSION_RETRIES: usize = 5;

pub(crate) enum VersionEdit<T> {
    Write(AttemptVersion, T),
    Keep(T),
}

/// Runs `edit` against the current document and stores the result with compare-and-set,
/// re-reading and re-applying when another writer changed the document in between.
pub(crate) async fn edit_version<T, F>(
    store: &dyn AttemptStore,
    attempt_id: Uuid,
    mut edit: F,
) -> Result<T>
where
    F: FnMut(Option<AttemptVersion>) -> Result<VersionEdit<T>>,
{
    for round in 1..=MAX_VERSION_RETRIES {
        let stored = store.load_version(attempt_id).await?;
        match edit(stored.parse()?)? {
            VersionEdit::Keep(out) => return Ok(out),
            VersionEdit::Write(document, out) => {
                let json = serde_json::to_value(&document)?;
                if store
                    .compare_and_set_version(attempt_id, stored.revision, &json)
                    .await?
                {
                    return Ok(out);
                }
                debug!(attempt_id = %attempt_id, round, "attempt version changed concurrently");
            }
        }
    }
    warn!(attempt_id = %attempt_id, "giving up on attempt version update");
    Err(Error::Conflict(format!(
        "Attempt {} version kept changing, try again",
        attempt_id
    )))
}

#[derive(Clone)]
pub struct AttemptService {
    content: Arc<dyn ContentStore>,
    attempts: Arc<dyn AttemptStore>,
}

impl AttemptService {
    pub fn new(content: Arc<dyn ContentStore>, attempts: Arc<dyn AttemptStore>) -> Self {
        Self { content, attempts }
    }

    pub async fn create_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<TestAttempt> {
        self.content.get_test(test_id).await?;
        let attempt = self.attempts.create_attempt(student_id, test_id).await?;
        info!(attempt_id = %attempt.id, student_id = %student_id, test_id = %test_id, "attempt created");
        Ok(attempt)
    }

    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<TestAttempt> {
        self.attempts.get_attempt(attempt_id).await
    }

    /// Every attempt of a student at one test, oldest first.
    pub async fn list_attempts(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<TestAttempt>> {
        self.attempts.list_attempts(student_id, test_id).await
    }

    /// Lays out the answers array once. Later calls return the stored document untouched.
    pub async fn init_attempt_version_if_empty(
        &self,
        attempt_id: Uuid,
        attempt_no: i32,
        questions: &[QuestionInit],
        test_title: Option<String>,
        min_point: Option<i32>,
    ) -> Result<AttemptVersion> {
        edit_version(self.attempts.as_ref(), attempt_id, |current| match current {
            Some(existing) => {
                debug!(attempt_id = %attempt_id, "attempt version already initialized");
                Ok(VersionEdit::Keep(existing))
            }
            None => {
                let fresh =
                    AttemptVersion::new(attempt_no, questions, test_title.clone(), min_point);
                Ok(VersionEdit::Write(fresh.clone(), fresh))
            }
        })
        .await
    }

    /// Initializes the version from the live test: questions in display order, attempt number
    /// one past the student's completed attempts.
    pub async fn prepare_attempt(&self, attempt_id: Uuid) -> Result<AttemptVersion> {
        let attempt = self.attempts.get_attempt(attempt_id).await?;
        let test = self.content.get_test(attempt.test_id).await?;
        let questions = load_content(
            self.content.as_ref(),
            &QuestionOwner::Test { test_id: test.id },
        )
        .await?;

        let inits: Vec<QuestionInit> = questions
            .iter()
            .map(|q| QuestionInit {
                question_id: q.question.id,
                order: Some(q.question.order),
                question_text: Some(q.question.text_of_question.clone()),
                max_points: Some(q.max_points()),
            })
            .collect();
        let completed = self
            .attempts
            .count_completed(attempt.student_id, attempt.test_id)
            .await?;
        let attempt_no = i32::try_from(completed + 1)
            .map_err(|_| Error::Internal("attempt counter overflow".to_string()))?;

        self.init_attempt_version_if_empty(
            attempt_id,
            attempt_no,
            &inits,
            Some(test.title),
            Some(test.min_point),
        )
        .await
    }

    pub async fn get_attempt_version(&self, attempt_id: Uuid) -> Result<Option<AttemptVersion>> {
        self.attempts.load_version(attempt_id).await?.parse()
    }

    /// Records the final score. The attempt date is fixed by the first completion.
    pub async fn complete_attempt_by_id(
        &self,
        attempt_id: Uuid,
        total_points: i32,
    ) -> Result<TestAttempt> {
        if total_points < 0 {
            return Err(Error::validation("total points must not be negative"));
        }
        let attempt = self
            .attempts
            .complete(attempt_id, total_points, today())
            .await?;
        info!(
            attempt_id = %attempt_id,
            point = total_points,
            date = ?attempt.date_of_attempt,
            "attempt completed"
        );
        Ok(attempt)
    }
}
