use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::AttemptStore;
use crate::error::{Error, Result};
use crate::models::attempt_version::{AnswerSelection, AttemptVersion};
use crate::services::attempt_service::{edit_version, VersionEdit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Recorded,
    /// The question already had an answer; nothing was written.
    AlreadyAnswered,
}

/// Extra question details recorded by `upsert_answers`.
#[derive(Debug, Clone, Default)]
pub struct QuestionDetails {
    pub question_text: Option<String>,
    pub max_points: Option<i32>,
}

fn empty_version() -> AttemptVersion {
    AttemptVersion::new(0, &[], None, None)
}

/// Writes student answers into the attempt version document.
#[derive(Clone)]
pub struct AnswerService {
    attempts: Arc<dyn AttemptStore>,
}

impl AnswerService {
    pub fn new(attempts: Arc<dyn AttemptStore>) -> Self {
        Self { attempts }
    }

    /// Append-once: the first non-empty answer for a question sticks, later calls are ignored.
    pub async fn save_answers(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        answer_ids: Vec<Uuid>,
        answer_points: Vec<i32>,
        earned_points: i32,
    ) -> Result<RecordOutcome> {
        if answer_ids.is_empty() {
            return Err(Error::validation("answerIds must not be empty"));
        }
        let selection = AnswerSelection {
            answer_ids,
            answer_texts: Vec::new(),
            answer_points,
            earned_points,
        }
        .normalized();

        let outcome = edit_version(self.attempts.as_ref(), attempt_id, |current| {
            let mut document = current.unwrap_or_else(empty_version);
            let entry = document.entry_mut(question_id);
            if entry.is_answered() {
                return Ok(VersionEdit::Keep(RecordOutcome::AlreadyAnswered));
            }
            entry.apply(selection.clone());
            Ok(VersionEdit::Write(document, RecordOutcome::Recorded))
        })
        .await?;

        match outcome {
            RecordOutcome::Recorded => {
                info!(attempt_id = %attempt_id, question_id = %question_id, "answer recorded")
            }
            RecordOutcome::AlreadyAnswered => {
                debug!(attempt_id = %attempt_id, question_id = %question_id, "question already answered, ignoring")
            }
        }
        Ok(outcome)
    }

    /// Overwrite: replaces whatever was recorded for the question.
    pub async fn upsert_answers(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        details: QuestionDetails,
        selection: AnswerSelection,
    ) -> Result<AttemptVersion> {
        let selection = selection.normalized();

        let document = edit_version(self.attempts.as_ref(), attempt_id, |current| {
            let mut document = current.unwrap_or_else(empty_version);
            let entry = document.entry_mut(question_id);
            if details.question_text.is_some() {
                entry.question_text = details.question_text.clone();
            }
            if details.max_points.is_some() {
                entry.max_points = details.max_points;
            }
            entry.apply(selection.clone());
            Ok(VersionEdit::Write(document.clone(), document))
        })
        .await?;

        info!(attempt_id = %attempt_id, question_id = %question_id, "answer upserted");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryAttemptStore;
    use crate::models::attempt_version::QuestionInit;
    use crate::services::attempt_service::MAX_VERSION_RETRIES;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{json, Value as JsonValue};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::test_attempt::{StoredVersion, TestAttempt};

    async fn attempt_with_questions(store: &MemoryAttemptStore, questions: &[Uuid]) -> Uuid {
        let attempt = store.create_attempt(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let inits: Vec<QuestionInit> = questions
            .iter()
            .enumerate()
            .map(|(i, id)| QuestionInit {
                question_id: *id,
                order: Some(i as i32 + 1),
                question_text: None,
                max_points: Some(5),
            })
            .collect();
        let doc = serde_json::to_value(AttemptVersion::new(1, &inits, None, None)).unwrap();
        store.compare_and_set_version(attempt.id, 0, &doc).await.unwrap();
        attempt.id
    }

    async fn read(store: &MemoryAttemptStore, id: Uuid) -> AttemptVersion {
        store.load_version(id).await.unwrap().parse().unwrap().unwrap()
    }

    #[tokio::test]
    async fn second_save_is_ignored() {
        let store = Arc::new(MemoryAttemptStore::new());
        let q1 = Uuid::new_v4();
        let (a1, a2) = (Uuid::new_v4(), Uuid::new_v4());
        let attempt = attempt_with_questions(&store, &[q1]).await;
        let service = AnswerService::new(store.clone());

        let first = service.save_answers(attempt, q1, vec![a1], vec![5], 5).await.unwrap();
        let second = service.save_answers(attempt, q1, vec![a2], vec![0], 0).await.unwrap();

        assert_eq!(first, RecordOutcome::Recorded);
        assert_eq!(second, RecordOutcome::AlreadyAnswered);
        let entry = read(&store, attempt).await.entry(q1).cloned().unwrap();
        assert_eq!(entry.answer_ids, vec![a1]);
        assert_eq!(entry.earned_points, 5);
    }

    #[tokio::test]
    async fn upsert_always_reflects_latest_call() {
        let store = Arc::new(MemoryAttemptStore::new());
        let q1 = Uuid::new_v4();
        let (a1, a2) = (Uuid::new_v4(), Uuid::new_v4());
        let attempt = attempt_with_questions(&store, &[q1]).await;
        let service = AnswerService::new(store.clone());

        service
            .upsert_answers(
                attempt,
                q1,
                QuestionDetails { question_text: Some("Pick one".into()), max_points: Some(5) },
                AnswerSelection {
                    answer_ids: vec![a1],
                    answer_texts: vec!["first".into()],
                    answer_points: vec![5],
                    earned_points: 5,
                },
            )
            .await
            .unwrap();
        let doc = service
            .upsert_answers(
                attempt,
                q1,
                QuestionDetails::default(),
                AnswerSelection {
                    answer_ids: vec![a2],
                    answer_texts: vec!["second".into()],
                    answer_points: vec![0],
                    earned_points: 0,
                },
            )
            .await
            .unwrap();

        let entry = doc.entry(q1).unwrap();
        assert_eq!(entry.answer_ids, vec![a2]);
        assert_eq!(entry.answer_texts, vec!["second".to_string()]);
        assert_eq!(entry.question_text.as_deref(), Some("Pick one"));
        assert_eq!(read(&store, attempt).await, doc);
    }

    #[tokio::test]
    async fn mismatched_points_are_zeroed() {
        let store = Arc::new(MemoryAttemptStore::new());
        let q1 = Uuid::new_v4();
        let attempt = attempt_with_questions(&store, &[q1]).await;
        let service = AnswerService::new(store.clone());

        service
            .save_answers(attempt, q1, vec![Uuid::new_v4(), Uuid::new_v4()], vec![5], 5)
            .await
            .unwrap();

        let entry = read(&store, attempt).await.entry(q1).cloned().unwrap();
        assert_eq!(entry.answer_points, vec![0, 0]);
        assert_eq!(entry.earned_points, 0);
    }

    #[tokio::test]
    async fn empty_answer_list_is_rejected() {
        let store = Arc::new(MemoryAttemptStore::new());
        let attempt = attempt_with_questions(&store, &[Uuid::new_v4()]).await;
        let service = AnswerService::new(store);
        let err = service
            .save_answers(attempt, Uuid::new_v4(), vec![], vec![], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn unknown_question_is_appended_after_layout() {
        let store = Arc::new(MemoryAttemptStore::new());
        let (q1, q2, extra) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let attempt = attempt_with_questions(&store, &[q1, q2]).await;
        let service = AnswerService::new(store.clone());

        service
            .save_answers(attempt, extra, vec![Uuid::new_v4()], vec![1], 1)
            .await
            .unwrap();

        let ids: Vec<Uuid> = read(&store, attempt)
            .await
            .answers
            .iter()
            .map(|e| e.question_id)
            .collect();
        assert_eq!(ids, vec![q1, q2, extra]);
    }

    #[tokio::test]
    async fn legacy_single_answer_counts_as_answered_and_is_rewritten() {
        let store = Arc::new(MemoryAttemptStore::new());
        let attempt = store.create_attempt(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let (q1, q2, legacy) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let doc = json!({
            "attemptNo": 1,
            "source": "import",
            "answers": [
                {"questionId": q1, "answerId": legacy, "earnedPoints": 3},
                {"questionId": q2, "answerId": "", "earnedPoints": 0}
            ]
        });
        store.compare_and_set_version(attempt.id, 0, &doc).await.unwrap();
        let service = AnswerService::new(store.clone());

        let q1_outcome = service
            .save_answers(attempt.id, q1, vec![Uuid::new_v4()], vec![1], 1)
            .await
            .unwrap();
        let fresh = Uuid::new_v4();
        let q2_outcome = service
            .save_answers(attempt.id, q2, vec![fresh], vec![2], 2)
            .await
            .unwrap();
        assert_eq!(q1_outcome, RecordOutcome::AlreadyAnswered);
        assert_eq!(q2_outcome, RecordOutcome::Recorded);

        let raw = store.get_attempt(attempt.id).await.unwrap().attempt_version.unwrap();
        assert_eq!(raw["source"], json!("import"));
        assert_eq!(raw["answers"][0]["answerIds"], json!([legacy]));
        assert_eq!(raw["answers"][1]["answerIds"], json!([fresh]));
        assert!(raw["answers"][0].get("answerId").is_none());
        assert!(raw["answers"][1].get("answerId").is_none());
    }

    #[tokio::test]
    async fn concurrent_saves_for_different_questions_both_land() {
        let store = Arc::new(MemoryAttemptStore::new());
        let questions: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let attempt = attempt_with_questions(&store, &questions).await;
        let service = AnswerService::new(store.clone());

        let handles: Vec<_> = questions
            .iter()
            .map(|q| {
                let service = service.clone();
                let q = *q;
                tokio::spawn(async move {
                    service.save_answers(attempt, q, vec![Uuid::new_v4()], vec![1], 1).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let doc = read(&store, attempt).await;
        assert_eq!(
            doc.answers.iter().filter(|e| e.is_answered()).count(),
            questions.len()
        );
    }

    /// Every compare-and-set loses, as if another writer always got there first.
    struct AlwaysStale {
        inner: MemoryAttemptStore,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl AttemptStore for AlwaysStale {
        async fn create_attempt(&self, s: Uuid, t: Uuid) -> Result<TestAttempt> {
            self.inner.create_attempt(s, t).await
        }
        async fn get_attempt(&self, id: Uuid) -> Result<TestAttempt> {
            self.inner.get_attempt(id).await
        }
        async fn list_attempts(&self, s: Uuid, t: Uuid) -> Result<Vec<TestAttempt>> {
            self.inner.list_attempts(s, t).await
        }
        async fn count_completed(&self, s: Uuid, t: Uuid) -> Result<i64> {
            self.inner.count_completed(s, t).await
        }
        async fn load_version(&self, id: Uuid) -> Result<StoredVersion> {
            self.inner.load_version(id).await
        }
        async fn compare_and_set_version(
            &self,
            _id: Uuid,
            _expected: i64,
            _document: &JsonValue,
        ) -> Result<bool> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
        async fn complete(&self, id: Uuid, point: i32, date: NaiveDate) -> Result<TestAttempt> {
            self.inner.complete(id, point, date).await
        }
        async fn set_snapshot(&self, id: Uuid, snapshot: &str) -> Result<()> {
            self.inner.set_snapshot(id, snapshot).await
        }
        async fn snapshot_attempt_ids(&self, s: Uuid, t: Uuid) -> Result<Vec<Uuid>> {
            self.inner.snapshot_attempt_ids(s, t).await
        }
        async fn delete_attempt(&self, id: Uuid) -> Result<()> {
            self.inner.delete_attempt(id).await
        }
    }

    #[tokio::test]
    async fn exhausted_retries_surface_conflict() {
        let inner = MemoryAttemptStore::new();
        let attempt = inner.create_attempt(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        let store = Arc::new(AlwaysStale { inner, writes: AtomicUsize::new(0) });
        let service = AnswerService::new(store.clone());

        let err = service
            .save_answers(attempt.id, Uuid::new_v4(), vec![Uuid::new_v4()], vec![1], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.writes.load(Ordering::SeqCst), MAX_VERSION_RETRIES);
    }
}
