//! In-process stores backing tests and local runs without Postgres. Every compound operation
//! holds a single write lock, which gives the same all-or-nothing behaviour as a transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::{AttemptStore, ContentStore};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, NewAnswer};
use crate::models::draft::{Draft, DraftInsert, NewDraft};
use crate::models::question::{NewQuestion, Question, QuestionContent, QuestionOwner};
use crate::models::test::{ContentHeader, Test};
use crate::models::test_attempt::{StoredVersion, TestAttempt};

#[derive(Default)]
struct ContentState {
    tests: HashMap<Uuid, Test>,
    drafts: HashMap<Uuid, Draft>,
    // Insertion order doubles as the tie-breaker for equal `order` values.
    questions: Vec<Question>,
    answers: Vec<Answer>,
}

impl ContentState {
    fn insert_content(&mut self, owner: QuestionOwner, content: &[QuestionContent]) {
        for item in content {
            let question = Question {
                id: Uuid::new_v4(),
                owner,
                text_of_question: item.text_of_question.clone(),
                order: item.order,
            };
            for answer in &item.answers {
                self.answers.push(Answer {
                    id: Uuid::new_v4(),
                    question_id: question.id,
                    text: answer.text.clone(),
                    score: answer.score,
                });
            }
            self.questions.push(question);
        }
    }

    fn delete_content(&mut self, owner: &QuestionOwner) {
        let (removed, kept): (Vec<Question>, Vec<Question>) = std::mem::take(&mut self.questions)
            .into_iter()
            .partition(|q| q.owner.same_owner(owner));
        self.questions = kept;
        self.answers
            .retain(|a| !removed.iter().any(|q| q.id == a.question_id));
    }

    fn questions_matching(&self, owner: &QuestionOwner) -> Vec<Question> {
        let mut out: Vec<Question> = self
            .questions
            .iter()
            .filter(|q| q.owner.same_owner(owner))
            .cloned()
            .collect();
        out.sort_by_key(|q| q.order);
        out
    }

    fn owner_exists(&self, owner: &QuestionOwner) -> bool {
        match owner {
            QuestionOwner::Test { test_id } => self.tests.contains_key(test_id),
            QuestionOwner::Draft { draft_id, .. } => self.drafts.contains_key(draft_id),
        }
    }
}

fn new_test(header: &ContentHeader) -> Test {
    let now = Utc::now();
    Test {
        id: Uuid::new_v4(),
        course_id: header.course_id,
        title: header.title.clone(),
        min_point: header.min_point,
        description: header.description.clone(),
        created_at: Some(now),
        updated_at: Some(now),
    }
}

fn apply_header_to_test(test: &mut Test, header: &ContentHeader) {
    test.course_id = header.course_id;
    test.title = header.title.clone();
    test.min_point = header.min_point;
    test.description = header.description.clone();
    test.updated_at = Some(Utc::now());
}

#[derive(Clone, Default)]
pub struct MemoryContentStore {
    state: Arc<RwLock<ContentState>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn create_test(&self, header: &ContentHeader, content: &[QuestionContent]) -> Result<Test> {
        let test = new_test(header);
        let mut state = self.state.write().await;
        state.insert_content(QuestionOwner::Test { test_id: test.id }, content);
        state.tests.insert(test.id, test.clone());
        Ok(test)
    }

    async fn get_test(&self, id: Uuid) -> Result<Test> {
        self.state
            .read()
            .await
            .tests
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))
    }

    async fn update_test(&self, id: Uuid, header: &ContentHeader) -> Result<Test> {
        let mut state = self.state.write().await;
        let test = state
            .tests
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))?;
        apply_header_to_test(test, header);
        Ok(test.clone())
    }

    async fn delete_test(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.tests.remove(&id).is_none() {
            return Err(Error::NotFound(format!("Test {} not found", id)));
        }
        state.delete_content(&QuestionOwner::Test { test_id: id });
        for question in state.questions.iter_mut() {
            if let QuestionOwner::Draft { source_test_id, .. } = &mut question.owner {
                if *source_test_id == Some(id) {
                    *source_test_id = None;
                }
            }
        }
        for draft in state.drafts.values_mut() {
            if draft.test_id == Some(id) {
                draft.test_id = None;
            }
        }
        Ok(())
    }

    async fn get_draft(&self, id: Uuid) -> Result<Draft> {
        self.state
            .read()
            .await
            .drafts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Draft {} not found", id)))
    }

    async fn find_draft_by_test_id(&self, test_id: Uuid) -> Result<Option<Draft>> {
        Ok(self
            .state
            .read()
            .await
            .drafts
            .values()
            .find(|d| d.test_id == Some(test_id))
            .cloned())
    }

    async fn list_drafts(&self, course_id: Option<Uuid>) -> Result<Vec<Draft>> {
        let state = self.state.read().await;
        let mut drafts: Vec<Draft> = state
            .drafts
            .values()
            .filter(|d| course_id.map_or(true, |c| d.course_id == c))
            .cloned()
            .collect();
        drafts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(drafts)
    }

    async fn insert_draft(&self, draft: &NewDraft, content: &[QuestionContent]) -> Result<DraftInsert> {
        let mut state = self.state.write().await;
        if let Some(test_id) = draft.test_id {
            if !state.tests.contains_key(&test_id) {
                return Err(Error::NotFound(format!("Test {} not found", test_id)));
            }
            if let Some(existing) = state.drafts.values().find(|d| d.test_id == Some(test_id)) {
                return Ok(DraftInsert::Existing(existing.clone()));
            }
        }

        let now = Utc::now();
        let created = Draft {
            id: Uuid::new_v4(),
            test_id: draft.test_id,
            course_id: draft.header.course_id,
            title: draft.header.title.clone(),
            min_point: draft.header.min_point,
            description: draft.header.description.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.insert_content(
            QuestionOwner::Draft {
                draft_id: created.id,
                source_test_id: created.test_id,
            },
            content,
        );
        state.drafts.insert(created.id, created.clone());
        Ok(DraftInsert::Created(created))
    }

    async fn update_draft(
        &self,
        id: Uuid,
        header: &ContentHeader,
        content: &[QuestionContent],
    ) -> Result<Draft> {
        let mut state = self.state.write().await;
        let draft = state
            .drafts
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Draft {} not found", id)))?;
        draft.course_id = header.course_id;
        draft.title = header.title.clone();
        draft.min_point = header.min_point;
        draft.description = header.description.clone();
        draft.updated_at = Some(Utc::now());
        let draft = draft.clone();

        let owner = QuestionOwner::Draft {
            draft_id: draft.id,
            source_test_id: draft.test_id,
        };
        state.delete_content(&owner);
        state.insert_content(owner, content);
        Ok(draft)
    }

    async fn delete_draft(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.drafts.remove(&id).is_none() {
            return Err(Error::NotFound(format!("Draft {} not found", id)));
        }
        state.delete_content(&QuestionOwner::Draft {
            draft_id: id,
            source_test_id: None,
        });
        Ok(())
    }

    async fn publish(&self, draft: &Draft, content: &[QuestionContent]) -> Result<Test> {
        let mut state = self.state.write().await;
        if !state.drafts.contains_key(&draft.id) {
            return Err(Error::NotFound(format!("Draft {} not found", draft.id)));
        }

        let header = draft.header();
        let test = match draft.test_id {
            Some(test_id) => {
                let test = state
                    .tests
                    .get_mut(&test_id)
                    .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;
                apply_header_to_test(test, &header);
                test.clone()
            }
            None => {
                let test = new_test(&header);
                state.tests.insert(test.id, test.clone());
                test
            }
        };

        let test_owner = QuestionOwner::Test { test_id: test.id };
        state.delete_content(&test_owner);
        state.insert_content(test_owner, content);

        state.delete_content(&QuestionOwner::Draft {
            draft_id: draft.id,
            source_test_id: draft.test_id,
        });
        state.drafts.remove(&draft.id);
        Ok(test)
    }

    async fn create_question(&self, question: &NewQuestion) -> Result<Question> {
        let mut state = self.state.write().await;
        if !state.owner_exists(&question.owner) {
            return Err(Error::NotFound("Question owner not found".to_string()));
        }
        let created = Question {
            id: Uuid::new_v4(),
            owner: question.owner,
            text_of_question: question.text_of_question.clone(),
            order: question.order,
        };
        state.questions.push(created.clone());
        Ok(created)
    }

    async fn delete_question(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.questions.len();
        state.questions.retain(|q| q.id != id);
        if state.questions.len() == before {
            return Err(Error::NotFound(format!("Question {} not found", id)));
        }
        state.answers.retain(|a| a.question_id != id);
        Ok(())
    }

    async fn questions_by_test(&self, test_id: Uuid) -> Result<Vec<Question>> {
        Ok(self
            .state
            .read()
            .await
            .questions_matching(&QuestionOwner::Test { test_id }))
    }

    async fn questions_by_draft(&self, draft_id: Uuid) -> Result<Vec<Question>> {
        Ok(self.state.read().await.questions_matching(&QuestionOwner::Draft {
            draft_id,
            source_test_id: None,
        }))
    }

    async fn create_answer(&self, answer: &NewAnswer) -> Result<Answer> {
        let mut state = self.state.write().await;
        if !state.questions.iter().any(|q| q.id == answer.question_id) {
            return Err(Error::NotFound(format!("Question {} not found", answer.question_id)));
        }
        let created = Answer {
            id: Uuid::new_v4(),
            question_id: answer.question_id,
            text: answer.text.clone(),
            score: answer.score,
        };
        state.answers.push(created.clone());
        Ok(created)
    }

    async fn delete_answer(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.answers.len();
        state.answers.retain(|a| a.id != id);
        if state.answers.len() == before {
            return Err(Error::NotFound(format!("Answer {} not found", id)));
        }
        Ok(())
    }

    async fn answers_by_question(&self, question_id: Uuid) -> Result<Vec<Answer>> {
        Ok(self
            .state
            .read()
            .await
            .answers
            .iter()
            .filter(|a| a.question_id == question_id)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct MemoryAttemptStore {
    attempts: Arc<RwLock<Vec<TestAttempt>>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn attempt_not_found(id: Uuid) -> Error {
    Error::NotFound(format!("Attempt {} not found", id))
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn create_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<TestAttempt> {
        let now = Utc::now();
        let attempt = TestAttempt {
            id: Uuid::new_v4(),
            student_id,
            test_id,
            date_of_attempt: None,
            point: None,
            certificate_id: None,
            attempt_version: None,
            version_revision: 0,
            attempt_snapshot: None,
            completed: false,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.attempts.write().await.push(attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: Uuid) -> Result<TestAttempt> {
        self.attempts
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| attempt_not_found(id))
    }

    async fn list_attempts(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<TestAttempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.student_id == student_id && a.test_id == test_id)
            .cloned()
            .collect())
    }

    async fn count_completed(&self, student_id: Uuid, test_id: Uuid) -> Result<i64> {
        let count = self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| a.student_id == student_id && a.test_id == test_id && a.completed)
            .count();
        Ok(count as i64)
    }

    async fn load_version(&self, id: Uuid) -> Result<StoredVersion> {
        let attempt = self.get_attempt(id).await?;
        Ok(StoredVersion {
            document: attempt.attempt_version,
            revision: attempt.version_revision,
        })
    }

    async fn compare_and_set_version(
        &self,
        id: Uuid,
        expected_revision: i64,
        document: &JsonValue,
    ) -> Result<bool> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| attempt_not_found(id))?;
        if attempt.version_revision != expected_revision {
            return Ok(false);
        }
        attempt.attempt_version = Some(document.clone());
        attempt.version_revision += 1;
        attempt.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn complete(&self, id: Uuid, point: i32, date: NaiveDate) -> Result<TestAttempt> {
        let mut attempts = self.attempts.write().await;
        let (student_id, test_id, effective_date) = {
            let attempt = attempts
                .iter()
                .find(|a| a.id == id)
                .ok_or_else(|| attempt_not_found(id))?;
            (
                attempt.student_id,
                attempt.test_id,
                attempt.date_of_attempt.unwrap_or(date),
            )
        };

        let clash = attempts.iter().any(|a| {
            a.id != id
                && a.student_id == student_id
                && a.test_id == test_id
                && a.date_of_attempt == Some(effective_date)
        });
        if clash {
            return Err(Error::Conflict(format!(
                "An attempt for this student and test is already recorded on {}",
                effective_date
            )));
        }

        let attempt = attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| attempt_not_found(id))?;
        attempt.point = Some(point);
        attempt.completed = true;
        attempt.date_of_attempt = Some(effective_date);
        attempt.updated_at = Some(Utc::now());
        Ok(attempt.clone())
    }

    async fn set_snapshot(&self, id: Uuid, snapshot: &str) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| attempt_not_found(id))?;
        attempt.attempt_snapshot = Some(snapshot.to_string());
        attempt.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn snapshot_attempt_ids(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|a| {
                a.student_id == student_id && a.test_id == test_id && a.attempt_snapshot.is_some()
            })
            .map(|a| a.id)
            .collect())
    }

    async fn delete_attempt(&self, id: Uuid) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let before = attempts.len();
        attempts.retain(|a| a.id != id);
        if attempts.len() == before {
            return Err(attempt_not_found(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::load_content;
    use crate::models::answer::AnswerContent;
    use serde_json::json;

    fn header(title: &str) -> ContentHeader {
        ContentHeader {
            course_id: Uuid::new_v4(),
            title: title.to_string(),
            min_point: 1,
            description: None,
        }
    }

    fn question(text: &str, order: i32) -> QuestionContent {
        QuestionContent {
            text_of_question: text.to_string(),
            order,
            answers: vec![
                AnswerContent { text: "right".into(), score: 1 },
                AnswerContent { text: "wrong".into(), score: 0 },
            ],
        }
    }

    #[tokio::test]
    async fn questions_keep_insertion_order_for_equal_order_values() {
        let store = MemoryContentStore::new();
        let test = store.create_test(&header("T"), &[]).await.unwrap();
        let created = store
            .insert_draft(
                &NewDraft { test_id: Some(test.id), header: header("T") },
                &[question("second", 2), question("first-a", 1), question("first-b", 1)],
            )
            .await
            .unwrap();
        let draft = created.into_draft();

        let content = load_content(
            &store,
            &QuestionOwner::Draft { draft_id: draft.id, source_test_id: draft.test_id },
        )
        .await
        .unwrap();
        let texts: Vec<_> = content
            .iter()
            .map(|q| q.question.text_of_question.as_str())
            .collect();
        assert_eq!(texts, vec!["first-a", "first-b", "second"]);
    }

    #[tokio::test]
    async fn second_draft_for_same_test_returns_existing() {
        let store = MemoryContentStore::new();
        let test = store.create_test(&header("T"), &[]).await.unwrap();
        let new_draft = NewDraft { test_id: Some(test.id), header: header("T") };

        let first = store.insert_draft(&new_draft, &[question("q", 1)]).await.unwrap();
        let second = store.insert_draft(&new_draft, &[]).await.unwrap();

        assert!(matches!(first, DraftInsert::Created(_)));
        match second {
            DraftInsert::Existing(d) => assert_eq!(d.id, first.into_draft().id),
            other => panic!("expected existing draft, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn publish_replaces_test_content_and_removes_draft() {
        let store = MemoryContentStore::new();
        let test = store.create_test(&header("Old"), &[]).await.unwrap();
        store
            .create_question(&NewQuestion {
                owner: QuestionOwner::Test { test_id: test.id },
                text_of_question: "stale".into(),
                order: 1,
            })
            .await
            .unwrap();

        let draft = store
            .insert_draft(
                &NewDraft { test_id: Some(test.id), header: header("New") },
                &[question("fresh", 1)],
            )
            .await
            .unwrap()
            .into_draft();

        let content = vec![question("fresh", 1)];
        let published = store.publish(&draft, &content).await.unwrap();
        assert_eq!(published.id, test.id);
        assert_eq!(published.title, "New");

        let questions = store.questions_by_test(test.id).await.unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text_of_question, "fresh");
        assert!(matches!(store.get_draft(draft.id).await, Err(Error::NotFound(_))));
        assert!(store.questions_by_draft(draft.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_test_unlinks_drafts() {
        let store = MemoryContentStore::new();
        let test = store.create_test(&header("T"), &[]).await.unwrap();
        let draft = store
            .insert_draft(&NewDraft { test_id: Some(test.id), header: header("T") }, &[question("q", 1)])
            .await
            .unwrap()
            .into_draft();

        store.delete_test(test.id).await.unwrap();

        let draft = store.get_draft(draft.id).await.unwrap();
        assert_eq!(draft.test_id, None);
        let questions = store.questions_by_draft(draft.id).await.unwrap();
        assert_eq!(questions[0].owner.test_id(), None);
    }

    #[tokio::test]
    async fn create_test_writes_its_content() {
        let store = MemoryContentStore::new();
        let test = store
            .create_test(&header("T"), &[question("b", 2), question("a", 1)])
            .await
            .unwrap();

        let content = load_content(&store, &QuestionOwner::Test { test_id: test.id })
            .await
            .unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0].question.text_of_question, "a");
        assert_eq!(content[0].answers.len(), 2);
    }

    #[tokio::test]
    async fn deleting_question_removes_its_answers() {
        let store = MemoryContentStore::new();
        let test = store.create_test(&header("T"), &[]).await.unwrap();
        let owner = QuestionOwner::Test { test_id: test.id };
        let doomed = store
            .create_question(&NewQuestion { owner, text_of_question: "doomed".into(), order: 1 })
            .await
            .unwrap();
        let kept = store
            .create_question(&NewQuestion { owner, text_of_question: "kept".into(), order: 2 })
            .await
            .unwrap();
        for question_id in [doomed.id, kept.id] {
            store
                .create_answer(&NewAnswer { question_id, text: "x".into(), score: 1 })
                .await
                .unwrap();
        }

        store.delete_question(doomed.id).await.unwrap();

        assert!(store.answers_by_question(doomed.id).await.unwrap().is_empty());
        assert_eq!(store.answers_by_question(kept.id).await.unwrap().len(), 1);
        assert_eq!(store.questions_by_test(test.id).await.unwrap(), vec![kept]);
        assert!(matches!(store.delete_question(doomed.id).await, Err(Error::NotFound(_))));
        assert!(matches!(
            store
                .create_answer(&NewAnswer { question_id: doomed.id, text: "y".into(), score: 0 })
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_answer_leaves_siblings() {
        let store = MemoryContentStore::new();
        let test = store.create_test(&header("T"), &[question("q", 1)]).await.unwrap();
        let question_id = store.questions_by_test(test.id).await.unwrap()[0].id;
        let answers = store.answers_by_question(question_id).await.unwrap();

        store.delete_answer(answers[0].id).await.unwrap();

        assert_eq!(store.answers_by_question(question_id).await.unwrap(), vec![answers[1].clone()]);
        assert!(matches!(store.delete_answer(answers[0].id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn attempts_are_listed_per_student_and_test() {
        let store = MemoryAttemptStore::new();
        let (student, test) = (Uuid::new_v4(), Uuid::new_v4());
        let first = store.create_attempt(student, test).await.unwrap();
        store.create_attempt(Uuid::new_v4(), test).await.unwrap();
        let second = store.create_attempt(student, test).await.unwrap();

        let ids: Vec<Uuid> = store
            .list_attempts(student, test)
            .await
            .unwrap()
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_revision() {
        let store = MemoryAttemptStore::new();
        let attempt = store.create_attempt(Uuid::new_v4(), Uuid::new_v4()).await.unwrap();

        assert!(store
            .compare_and_set_version(attempt.id, 0, &json!({"attemptNo": 1}))
            .await
            .unwrap());
        assert!(!store
            .compare_and_set_version(attempt.id, 0, &json!({"attemptNo": 2}))
            .await
            .unwrap());

        let stored = store.load_version(attempt.id).await.unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.document, Some(json!({"attemptNo": 1})));
    }

    #[tokio::test]
    async fn completion_keeps_first_date_and_rejects_same_day_duplicate() {
        let store = MemoryAttemptStore::new();
        let (student, test) = (Uuid::new_v4(), Uuid::new_v4());
        let first = store.create_attempt(student, test).await.unwrap();
        let second = store.create_attempt(student, test).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();

        store.complete(first.id, 4, day).await.unwrap();
        let again = store.complete(first.id, 6, next_day).await.unwrap();
        assert_eq!(again.date_of_attempt, Some(day));
        assert_eq!(again.point, Some(6));

        let err = store.complete(second.id, 3, day).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.count_completed(student, test).await.unwrap(), 1);
    }
}
