use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::database::{load_content, ContentStore};
use crate::error::Result;
use crate::models::question::{QuestionContent, QuestionOwner, QuestionWithAnswers};
use crate::models::test::{ContentHeader, Test};
use crate::utils::validation::validate_content;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestWithContent {
    #[serde(flatten)]
    pub test: Test,
    pub questions: Vec<QuestionWithAnswers>,
}

#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn ContentStore>,
}

impl TestService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Creates a test directly, without going through a draft.
    pub async fn create_test(
        &self,
        header: ContentHeader,
        questions: Vec<QuestionContent>,
    ) -> Result<TestWithContent> {
        validate_content(&header, &questions)?;

        let test = self.store.create_test(&header, &questions).await?;

        info!(test_id = %test.id, questions = questions.len(), "test created");
        self.get_test(test.id).await
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<TestWithContent> {
        let test = self.store.get_test(test_id).await?;
        let questions = load_content(self.store.as_ref(), &QuestionOwner::Test { test_id }).await?;
        Ok(TestWithContent { test, questions })
    }

    /// Edits the test header in place. The threshold is checked against the live questions.
    pub async fn update_test(&self, test_id: Uuid, header: ContentHeader) -> Result<TestWithContent> {
        let current = self.get_test(test_id).await?;
        let content: Vec<QuestionContent> =
            current.questions.iter().map(QuestionWithAnswers::to_content).collect();
        validate_content(&header, &content)?;

        let test = self.store.update_test(test_id, &header).await?;
        info!(test_id = %test_id, "test updated");
        Ok(TestWithContent {
            test,
            questions: current.questions,
        })
    }

    pub async fn delete_test(&self, test_id: Uuid) -> Result<()> {
        self.store.delete_test(test_id).await?;
        info!(test_id = %test_id, "test deleted");
        Ok(())
    }
}
