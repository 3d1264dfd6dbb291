use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::database::store::ContentStore;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, NewAnswer};
use crate::models::draft::{Draft, DraftInsert, NewDraft};
use crate::models::question::{NewQuestion, Question, QuestionContent, QuestionOwner, QuestionRow};
use crate::models::test::{ContentHeader, Test};

const TEST_COLUMNS: &str = "id, course_id, title, min_point, description, created_at, updated_at";
const DRAFT_COLUMNS: &str =
    "id, test_id, course_id, title, min_point, description, created_at, updated_at";
const QUESTION_COLUMNS: &str = "id, owner_kind, test_id, draft_id, text_of_question, order_index";

#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn foreign_key_to_not_found(err: sqlx::Error, what: &str) -> Error {
    let is_fk = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23503")
        .unwrap_or(false);
    if is_fk {
        Error::NotFound(format!("{} not found", what))
    } else {
        err.into()
    }
}

async fn insert_content(
    conn: &mut PgConnection,
    owner: &QuestionOwner,
    content: &[QuestionContent],
) -> Result<()> {
    for question in content {
        let question_id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO questions (id, owner_kind, test_id, draft_id, text_of_question, order_index)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(question_id)
        .bind(owner.kind())
        .bind(owner.test_id())
        .bind(owner.draft_id())
        .bind(&question.text_of_question)
        .bind(question.order)
        .execute(&mut *conn)
        .await?;

        for answer in &question.answers {
            sqlx::query(r#"INSERT INTO answers (id, question_id, text, score) VALUES ($1, $2, $3, $4)"#)
                .bind(Uuid::new_v4())
                .bind(question_id)
                .bind(&answer.text)
                .bind(answer.score)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn delete_content(conn: &mut PgConnection, owner: &QuestionOwner) -> Result<()> {
    match owner {
        QuestionOwner::Test { test_id } => {
            sqlx::query(r#"DELETE FROM questions WHERE owner_kind = 'test' AND test_id = $1"#)
                .bind(test_id)
                .execute(&mut *conn)
                .await?;
        }
        QuestionOwner::Draft { draft_id, .. } => {
            sqlx::query(r#"DELETE FROM questions WHERE owner_kind = 'draft' AND draft_id = $1"#)
                .bind(draft_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn insert_test(conn: &mut PgConnection, header: &ContentHeader) -> Result<Test> {
    let sql = format!(
        "INSERT INTO tests (id, course_id, title, min_point, description)
         VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        TEST_COLUMNS
    );
    let test = sqlx::query_as::<_, Test>(&sql)
        .bind(Uuid::new_v4())
        .bind(header.course_id)
        .bind(&header.title)
        .bind(header.min_point)
        .bind(&header.description)
        .fetch_one(&mut *conn)
        .await?;
    Ok(test)
}

async fn fetch_questions(pool: &PgPool, filter: &str, id: Uuid) -> Result<Vec<Question>> {
    let sql = format!(
        "SELECT {} FROM questions WHERE {} ORDER BY order_index ASC, seq ASC",
        QUESTION_COLUMNS, filter
    );
    let rows = sqlx::query_as::<_, QuestionRow>(&sql)
        .bind(id)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(Question::try_from).collect()
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn create_test(&self, header: &ContentHeader, content: &[QuestionContent]) -> Result<Test> {
        let mut tx = self.pool.begin().await?;
        let test = insert_test(&mut tx, header).await?;
        insert_content(&mut tx, &QuestionOwner::Test { test_id: test.id }, content).await?;
        tx.commit().await?;
        Ok(test)
    }

    async fn get_test(&self, id: Uuid) -> Result<Test> {
        let sql = format!("SELECT {} FROM tests WHERE id = $1", TEST_COLUMNS);
        sqlx::query_as::<_, Test>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))
    }

    async fn update_test(&self, id: Uuid, header: &ContentHeader) -> Result<Test> {
        let sql = format!(
            "UPDATE tests SET course_id = $2, title = $3, min_point = $4, description = $5,
                 updated_at = NOW()
             WHERE id = $1 RETURNING {}",
            TEST_COLUMNS
        );
        sqlx::query_as::<_, Test>(&sql)
            .bind(id)
            .bind(header.course_id)
            .bind(&header.title)
            .bind(header.min_point)
            .bind(&header.description)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", id)))
    }

    async fn delete_test(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_content(&mut tx, &QuestionOwner::Test { test_id: id }).await?;
        sqlx::query(r#"UPDATE questions SET test_id = NULL WHERE owner_kind = 'draft' AND test_id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query(r#"DELETE FROM tests WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Test {} not found", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_draft(&self, id: Uuid) -> Result<Draft> {
        let sql = format!("SELECT {} FROM drafts WHERE id = $1", DRAFT_COLUMNS);
        sqlx::query_as::<_, Draft>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Draft {} not found", id)))
    }

    async fn find_draft_by_test_id(&self, test_id: Uuid) -> Result<Option<Draft>> {
        let sql = format!("SELECT {} FROM drafts WHERE test_id = $1", DRAFT_COLUMNS);
        let draft = sqlx::query_as::<_, Draft>(&sql)
            .bind(test_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(draft)
    }

    async fn list_drafts(&self, course_id: Option<Uuid>) -> Result<Vec<Draft>> {
        let sql = format!(
            "SELECT {} FROM drafts WHERE ($1::uuid IS NULL OR course_id = $1)
             ORDER BY updated_at DESC NULLS LAST",
            DRAFT_COLUMNS
        );
        let drafts = sqlx::query_as::<_, Draft>(&sql)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(drafts)
    }

    async fn insert_draft(&self, draft: &NewDraft, content: &[QuestionContent]) -> Result<DraftInsert> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO drafts (id, test_id, course_id, title, min_point, description)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (test_id) WHERE test_id IS NOT NULL DO NOTHING
             RETURNING {}",
            DRAFT_COLUMNS
        );
        let inserted = sqlx::query_as::<_, Draft>(&sql)
            .bind(Uuid::new_v4())
            .bind(draft.test_id)
            .bind(draft.header.course_id)
            .bind(&draft.header.title)
            .bind(draft.header.min_point)
            .bind(&draft.header.description)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| foreign_key_to_not_found(e, "Test"))?;

        match inserted {
            Some(created) => {
                let owner = QuestionOwner::Draft {
                    draft_id: created.id,
                    source_test_id: created.test_id,
                };
                insert_content(&mut tx, &owner, content).await?;
                tx.commit().await?;
                Ok(DraftInsert::Created(created))
            }
            None => {
                tx.rollback().await?;
                let test_id = draft
                    .test_id
                    .ok_or_else(|| Error::Internal("draft insert conflicted without a test id".into()))?;
                let existing = self
                    .find_draft_by_test_id(test_id)
                    .await?
                    .ok_or_else(|| Error::Conflict(format!("Draft for test {} changed concurrently", test_id)))?;
                Ok(DraftInsert::Existing(existing))
            }
        }
    }

    async fn update_draft(
        &self,
        id: Uuid,
        header: &ContentHeader,
        content: &[QuestionContent],
    ) -> Result<Draft> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE drafts SET course_id = $2, title = $3, min_point = $4, description = $5,
                 updated_at = NOW()
             WHERE id = $1 RETURNING {}",
            DRAFT_COLUMNS
        );
        let draft = sqlx::query_as::<_, Draft>(&sql)
            .bind(id)
            .bind(header.course_id)
            .bind(&header.title)
            .bind(header.min_point)
            .bind(&header.description)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Draft {} not found", id)))?;

        let owner = QuestionOwner::Draft {
            draft_id: draft.id,
            source_test_id: draft.test_id,
        };
        delete_content(&mut tx, &owner).await?;
        insert_content(&mut tx, &owner, content).await?;
        tx.commit().await?;
        Ok(draft)
    }

    async fn delete_draft(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_content(
            &mut tx,
            &QuestionOwner::Draft {
                draft_id: id,
                source_test_id: None,
            },
        )
        .await?;
        let deleted = sqlx::query(r#"DELETE FROM drafts WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Draft {} not found", id)));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn publish(&self, draft: &Draft, content: &[QuestionContent]) -> Result<Test> {
        let header = draft.header();
        let mut tx = self.pool.begin().await?;

        let test = match draft.test_id {
            Some(test_id) => {
                let sql = format!(
                    "UPDATE tests SET course_id = $2, title = $3, min_point = $4, description = $5,
                         updated_at = NOW()
                     WHERE id = $1 RETURNING {}",
                    TEST_COLUMNS
                );
                sqlx::query_as::<_, Test>(&sql)
                    .bind(test_id)
                    .bind(header.course_id)
                    .bind(&header.title)
                    .bind(header.min_point)
                    .bind(&header.description)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?
            }
            None => insert_test(&mut tx, &header).await?,
        };

        let test_owner = QuestionOwner::Test { test_id: test.id };
        delete_content(&mut tx, &test_owner).await?;
        insert_content(&mut tx, &test_owner, content).await?;

        delete_content(
            &mut tx,
            &QuestionOwner::Draft {
                draft_id: draft.id,
                source_test_id: draft.test_id,
            },
        )
        .await?;
        let deleted = sqlx::query(r#"DELETE FROM drafts WHERE id = $1"#)
            .bind(draft.id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Draft {} not found", draft.id)));
        }

        tx.commit().await?;
        Ok(test)
    }

    async fn create_question(&self, question: &NewQuestion) -> Result<Question> {
        let sql = format!(
            "INSERT INTO questions (id, owner_kind, test_id, draft_id, text_of_question, order_index)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            QUESTION_COLUMNS
        );
        let row = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(question.owner.kind())
            .bind(question.owner.test_id())
            .bind(question.owner.draft_id())
            .bind(&question.text_of_question)
            .bind(question.order)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| foreign_key_to_not_found(e, "Question owner"))?;
        Question::try_from(row)
    }

    async fn delete_question(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query(r#"DELETE FROM questions WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Question {} not found", id)));
        }
        Ok(())
    }

    async fn questions_by_test(&self, test_id: Uuid) -> Result<Vec<Question>> {
        fetch_questions(&self.pool, "owner_kind = 'test' AND test_id = $1", test_id).await
    }

    async fn questions_by_draft(&self, draft_id: Uuid) -> Result<Vec<Question>> {
        fetch_questions(&self.pool, "owner_kind = 'draft' AND draft_id = $1", draft_id).await
    }

    async fn create_answer(&self, answer: &NewAnswer) -> Result<Answer> {
        let created = sqlx::query_as::<_, Answer>(
            r#"INSERT INTO answers (id, question_id, text, score) VALUES ($1, $2, $3, $4)
               RETURNING id, question_id, text, score"#,
        )
        .bind(Uuid::new_v4())
        .bind(answer.question_id)
        .bind(&answer.text)
        .bind(answer.score)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| foreign_key_to_not_found(e, "Question"))?;
        Ok(created)
    }

    async fn delete_answer(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query(r#"DELETE FROM answers WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Answer {} not found", id)));
        }
        Ok(())
    }

    async fn answers_by_question(&self, question_id: Uuid) -> Result<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(
            r#"SELECT id, question_id, text, score FROM answers WHERE question_id = $1 ORDER BY seq ASC"#,
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }
}
