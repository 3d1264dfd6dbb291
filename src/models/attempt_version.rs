//! The versioned attempt document stored in `test_attempts.attempt_version`.
//!
//! The document is append-only in spirit: the `answers` array is laid out once, in the order
//! the questions were presented, and later writes only touch individual entries. Older rows
//! may carry a single `answerId` instead of `answerIds`; the reader below accepts either and
//! the writer only ever emits the multi-answer shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptVersion {
    #[serde(default)]
    pub attempt_no: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_point: Option<i32>,
    #[serde(default)]
    pub answers: Vec<AnswerEntry>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredAnswerEntry")]
pub struct AnswerEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    pub question_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_points: Option<i32>,
    pub answer_ids: Vec<Uuid>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answer_texts: Vec<String>,
    pub answer_points: Vec<i32>,
    pub earned_points: i32,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Either shape an entry has been persisted in.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAnswerEntry {
    #[serde(default)]
    order: Option<i32>,
    question_id: Uuid,
    #[serde(default)]
    question_text: Option<String>,
    #[serde(default)]
    max_points: Option<i32>,
    #[serde(default)]
    answer_id: Option<LegacyAnswerId>,
    #[serde(default)]
    answer_ids: Vec<Uuid>,
    #[serde(default)]
    answer_texts: Vec<String>,
    #[serde(default)]
    answer_points: Vec<i32>,
    #[serde(default)]
    earned_points: i32,
    #[serde(flatten)]
    extra: Map<String, JsonValue>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyAnswerId {
    Id(Uuid),
    /// Blank strings and other placeholders written before multi-answer support.
    Other(serde::de::IgnoredAny),
}

impl From<StoredAnswerEntry> for AnswerEntry {
    fn from(stored: StoredAnswerEntry) -> Self {
        let mut answer_ids = stored.answer_ids;
        if answer_ids.is_empty() {
            if let Some(LegacyAnswerId::Id(id)) = stored.answer_id {
                answer_ids.push(id);
            }
        }

        let mut answer_points = stored.answer_points;
        if answer_points.len() != answer_ids.len() {
            answer_points = vec![0; answer_ids.len()];
        }

        let mut answer_texts = stored.answer_texts;
        if answer_texts.len() != answer_ids.len() {
            answer_texts.clear();
        }

        AnswerEntry {
            order: stored.order,
            question_id: stored.question_id,
            question_text: stored.question_text,
            max_points: stored.max_points,
            answer_ids,
            answer_texts,
            answer_points,
            earned_points: stored.earned_points,
            extra: stored.extra,
        }
    }
}

/// One question as it is laid out when an attempt starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionInit {
    pub question_id: Uuid,
    pub order: Option<i32>,
    pub question_text: Option<String>,
    pub max_points: Option<i32>,
}

/// Answer data supplied by the grading caller for one question.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnswerSelection {
    pub answer_ids: Vec<Uuid>,
    pub answer_texts: Vec<String>,
    pub answer_points: Vec<i32>,
    pub earned_points: i32,
}

impl AnswerSelection {
    /// Enforces the parallel-array invariants.
    ///
    /// Points whose count disagrees with the ids are replaced by zeros and the earned total is
    /// forced to zero. Texts of the wrong length are dropped. Repeated ids keep their first
    /// occurrence together with its point and text.
    pub fn normalized(mut self) -> Self {
        if self.answer_points.len() != self.answer_ids.len() {
            self.answer_points = vec![0; self.answer_ids.len()];
            self.earned_points = 0;
        }
        if self.answer_texts.len() != self.answer_ids.len() {
            self.answer_texts.clear();
        }

        let mut seen = Vec::with_capacity(self.answer_ids.len());
        let mut keep = Vec::with_capacity(self.answer_ids.len());
        for id in &self.answer_ids {
            keep.push(!seen.contains(id));
            seen.push(*id);
        }
        if keep.iter().all(|k| *k) {
            return self;
        }

        self.answer_ids = retain_flagged(self.answer_ids, &keep);
        self.answer_points = retain_flagged(self.answer_points, &keep);
        if !self.answer_texts.is_empty() {
            self.answer_texts = retain_flagged(self.answer_texts, &keep);
        }
        self
    }
}

fn retain_flagged<T>(items: Vec<T>, keep: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(keep.iter())
        .filter_map(|(item, k)| k.then_some(item))
        .collect()
}

impl AnswerEntry {
    pub fn pending(question_id: Uuid) -> Self {
        Self {
            order: None,
            question_id,
            question_text: None,
            max_points: None,
            answer_ids: Vec::new(),
            answer_texts: Vec::new(),
            answer_points: Vec::new(),
            earned_points: 0,
            extra: Map::new(),
        }
    }

    pub fn from_init(init: &QuestionInit) -> Self {
        Self {
            order: init.order,
            question_text: init.question_text.clone(),
            max_points: init.max_points,
            ..Self::pending(init.question_id)
        }
    }

    pub fn is_answered(&self) -> bool {
        !self.answer_ids.is_empty()
    }

    pub fn apply(&mut self, selection: AnswerSelection) {
        self.answer_ids = selection.answer_ids;
        self.answer_texts = selection.answer_texts;
        self.answer_points = selection.answer_points;
        self.earned_points = selection.earned_points;
    }
}

impl AttemptVersion {
    pub fn new(
        attempt_no: i32,
        questions: &[QuestionInit],
        test_title: Option<String>,
        min_point: Option<i32>,
    ) -> Self {
        Self {
            attempt_no,
            test_title,
            min_point,
            answers: questions.iter().map(AnswerEntry::from_init).collect(),
            extra: Map::new(),
        }
    }

    pub fn entry(&self, question_id: Uuid) -> Option<&AnswerEntry> {
        self.answers.iter().find(|e| e.question_id == question_id)
    }

    /// The entry for `question_id`, appended at the end if the layout never had it.
    pub fn entry_mut(&mut self, question_id: Uuid) -> &mut AnswerEntry {
        let pos = match self.answers.iter().position(|e| e.question_id == question_id) {
            Some(pos) => pos,
            None => {
                self.answers.push(AnswerEntry::pending(question_id));
                self.answers.len() - 1
            }
        };
        &mut self.answers[pos]
    }
}
