use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::{load_content, ContentStore};
use crate::error::{Error, Result};
use crate::models::draft::{Draft, DraftInsert, NewDraft};
use crate::models::question::{QuestionContent, QuestionOwner, QuestionWithAnswers};
use crate::models::test::ContentHeader;
use crate::services::test_service::TestWithContent;
use crate::utils::validation::validate_content;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftWithContent {
    #[serde(flatten)]
    pub draft: Draft,
    pub questions: Vec<QuestionWithAnswers>,
}

/// Everything an author submits when saving a draft.
#[derive(Debug, Clone)]
pub struct DraftInput {
    pub draft_id: Option<Uuid>,
    pub test_id: Option<Uuid>,
    pub header: ContentHeader,
    pub questions: Vec<QuestionContent>,
}

fn draft_owner(draft: &Draft) -> QuestionOwner {
    QuestionOwner::Draft {
        draft_id: draft.id,
        source_test_id: draft.test_id,
    }
}

/// Moves content between the editable draft and the published test.
#[derive(Clone)]
pub struct DraftService {
    store: Arc<dyn ContentStore>,
}

impl DraftService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    async fn with_content(&self, draft: Draft) -> Result<DraftWithContent> {
        let questions = load_content(self.store.as_ref(), &draft_owner(&draft)).await?;
        Ok(DraftWithContent { draft, questions })
    }

    /// Returns the draft already open for `test_id`, or copies the test into a new one.
    pub async fn create_draft_from_test(&self, test_id: Uuid) -> Result<DraftWithContent> {
        if let Some(existing) = self.store.find_draft_by_test_id(test_id).await? {
            debug!(test_id = %test_id, draft_id = %existing.id, "draft already open for test");
            return self.with_content(existing).await;
        }

        let test = self.store.get_test(test_id).await?;
        let content: Vec<QuestionContent> =
            load_content(self.store.as_ref(), &QuestionOwner::Test { test_id })
                .await?
                .iter()
                .map(QuestionWithAnswers::to_content)
                .collect();

        let new_draft = NewDraft {
            test_id: Some(test.id),
            header: ContentHeader::from(&test),
        };
        let draft = match self.store.insert_draft(&new_draft, &content).await? {
            DraftInsert::Created(draft) => {
                info!(test_id = %test_id, draft_id = %draft.id, questions = content.len(), "draft created from test");
                draft
            }
            DraftInsert::Existing(draft) => {
                debug!(test_id = %test_id, draft_id = %draft.id, "concurrent draft creation, returning winner");
                draft
            }
        };
        self.with_content(draft).await
    }

    /// Creates or replaces a draft. Existing questions and answers of the draft are discarded
    /// and the submitted set is written in their place.
    pub async fn save_draft(&self, input: DraftInput) -> Result<DraftWithContent> {
        validate_content(&input.header, &input.questions)?;

        let draft = match (input.draft_id, input.test_id) {
            (Some(draft_id), test_id) => {
                let current = self.store.get_draft(draft_id).await?;
                if test_id.is_some() && test_id != current.test_id {
                    return Err(Error::BadRequest(format!(
                        "Draft {} is not linked to test {}",
                        draft_id,
                        test_id.map(|t| t.to_string()).unwrap_or_default()
                    )));
                }
                self.store
                    .update_draft(draft_id, &input.header, &input.questions)
                    .await?
            }
            (None, Some(test_id)) => {
                self.store.get_test(test_id).await?;
                match self.store.find_draft_by_test_id(test_id).await? {
                    Some(existing) => {
                        self.store
                            .update_draft(existing.id, &input.header, &input.questions)
                            .await?
                    }
                    None => self.insert_or_update(Some(test_id), &input).await?,
                }
            }
            (None, None) => self.insert_or_update(None, &input).await?,
        };

        info!(draft_id = %draft.id, test_id = ?draft.test_id, questions = input.questions.len(), "draft saved");
        self.with_content(draft).await
    }

    async fn insert_or_update(&self, test_id: Option<Uuid>, input: &DraftInput) -> Result<Draft> {
        let new_draft = NewDraft {
            test_id,
            header: input.header.clone(),
        };
        match self.store.insert_draft(&new_draft, &input.questions).await? {
            DraftInsert::Created(draft) => Ok(draft),
            DraftInsert::Existing(winner) => {
                self.store
                    .update_draft(winner.id, &input.header, &input.questions)
                    .await
            }
        }
    }

    /// Copies the draft into its test (or a new test) and removes the draft.
    pub async fn publish(&self, draft_id: Uuid) -> Result<TestWithContent> {
        let draft = self.store.get_draft(draft_id).await?;
        let content: Vec<QuestionContent> = load_content(self.store.as_ref(), &draft_owner(&draft))
            .await?
            .iter()
            .map(QuestionWithAnswers::to_content)
            .collect();
        validate_content(&draft.header(), &content)?;

        let test = self.store.publish(&draft, &content).await?;
        info!(
            draft_id = %draft_id,
            test_id = %test.id,
            new_test = draft.test_id.is_none(),
            questions = content.len(),
            "draft published"
        );

        let questions = load_content(self.store.as_ref(), &QuestionOwner::Test { test_id: test.id }).await?;
        Ok(TestWithContent { test, questions })
    }

    pub async fn delete_draft(&self, draft_id: Uuid) -> Result<()> {
        self.store.delete_draft(draft_id).await?;
        info!(draft_id = %draft_id, "draft deleted");
        Ok(())
    }

    pub async fn get_draft(&self, draft_id: Uuid) -> Result<DraftWithContent> {
        let draft = self.store.get_draft(draft_id).await?;
        self.with_content(draft).await
    }

    pub async fn list_drafts(&self, course_id: Option<Uuid>) -> Result<Vec<DraftWithContent>> {
        let drafts = self.store.list_drafts(course_id).await?;
        let mut out = Vec::with_capacity(drafts.len());
        for draft in drafts {
            out.push(self.with_content(draft).await?);
        }
        Ok(out)
    }
}
