use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::store::AttemptStore;
use crate::error::{Error, Result};
use crate::models::test_attempt::{StoredVersion, TestAttempt};

const ATTEMPT_COLUMNS: &str = "id, student_id, test_id, date_of_attempt, point, certificate_id, \
     attempt_version, version_revision, attempt_snapshot, completed, created_at, updated_at";

#[derive(Clone)]
pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let found: Option<(Uuid,)> = sqlx::query_as(r#"SELECT id FROM test_attempts WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound(format!("Attempt {} not found", id))
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn create_attempt(&self, student_id: Uuid, test_id: Uuid) -> Result<TestAttempt> {
        let sql = format!(
            "INSERT INTO test_attempts (id, student_id, test_id) VALUES ($1, $2, $3) RETURNING {}",
            ATTEMPT_COLUMNS
        );
        let attempt = sqlx::query_as::<_, TestAttempt>(&sql)
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(test_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(attempt)
    }

    async fn get_attempt(&self, id: Uuid) -> Result<TestAttempt> {
        let sql = format!("SELECT {} FROM test_attempts WHERE id = $1", ATTEMPT_COLUMNS);
        sqlx::query_as::<_, TestAttempt>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn list_attempts(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<TestAttempt>> {
        let sql = format!(
            "SELECT {} FROM test_attempts WHERE student_id = $1 AND test_id = $2
             ORDER BY created_at ASC",
            ATTEMPT_COLUMNS
        );
        let attempts = sqlx::query_as::<_, TestAttempt>(&sql)
            .bind(student_id)
            .bind(test_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(attempts)
    }

    async fn count_completed(&self, student_id: Uuid, test_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM test_attempts
               WHERE student_id = $1 AND test_id = $2 AND completed = TRUE"#,
        )
        .bind(student_id)
        .bind(test_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn load_version(&self, id: Uuid) -> Result<StoredVersion> {
        let row: Option<(Option<JsonValue>, i64)> = sqlx::query_as(
            r#"SELECT attempt_version, version_revision FROM test_attempts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let (document, revision) = row.ok_or_else(|| not_found(id))?;
        Ok(StoredVersion { document, revision })
    }

    async fn compare_and_set_version(
        &self,
        id: Uuid,
        expected_revision: i64,
        document: &JsonValue,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"UPDATE test_attempts
               SET attempt_version = $3, version_revision = version_revision + 1, updated_at = NOW()
               WHERE id = $1 AND version_revision = $2"#,
        )
        .bind(id)
        .bind(expected_revision)
        .bind(document)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(true);
        }
        if self.exists(id).await? {
            Ok(false)
        } else {
            Err(not_found(id))
        }
    }

    async fn complete(&self, id: Uuid, point: i32, date: NaiveDate) -> Result<TestAttempt> {
        let sql = format!(
            "UPDATE test_attempts
             SET point = $2, completed = TRUE,
                 date_of_attempt = COALESCE(date_of_attempt, $3), updated_at = NOW()
             WHERE id = $1 RETURNING {}",
            ATTEMPT_COLUMNS
        );
        let result = sqlx::query_as::<_, TestAttempt>(&sql)
            .bind(id)
            .bind(point)
            .bind(date)
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(Some(attempt)) => Ok(attempt),
            Ok(None) => Err(not_found(id)),
            Err(err) => {
                let unique = err
                    .as_database_error()
                    .and_then(|db| db.code())
                    .map(|code| code == "23505")
                    .unwrap_or(false);
                if unique {
                    Err(Error::Conflict(format!(
                        "An attempt for this student and test is already recorded on {}",
                        date
                    )))
                } else {
                    Err(err.into())
                }
            }
        }
    }

    async fn set_snapshot(&self, id: Uuid, snapshot: &str) -> Result<()> {
        let updated = sqlx::query(
            r#"UPDATE test_attempts SET attempt_snapshot = $2, updated_at = NOW() WHERE id = $1"#,
        )
        .bind(id)
        .bind(snapshot)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn snapshot_attempt_ids(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM test_attempts
               WHERE student_id = $1 AND test_id = $2 AND attempt_snapshot IS NOT NULL
               ORDER BY created_at ASC"#,
        )
        .bind(student_id)
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn delete_attempt(&self, id: Uuid) -> Result<()> {
        let deleted = sqlx::query(r#"DELETE FROM test_attempts WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}
