//! Content rules that must hold before a draft is saved or published.

use crate::error::ValidationFailure;
use crate::models::question::QuestionContent;
use crate::models::test::ContentHeader;

pub const MIN_ANSWERS_PER_QUESTION: usize = 2;
pub const MAX_ANSWER_SCORE: i32 = 10_000;

/// Checks the header and questions together. Indices in the failure are zero-based positions
/// in `questions` and in each question's answer list.
pub fn validate_content(
    header: &ContentHeader,
    questions: &[QuestionContent],
) -> Result<(), ValidationFailure> {
    if header.title.trim().is_empty() {
        return Err(ValidationFailure::new("title must not be empty"));
    }
    if header.min_point < 0 {
        return Err(ValidationFailure::new("minPoint must not be negative"));
    }
    if questions.is_empty() {
        return Err(ValidationFailure::new("test must contain at least one question"));
    }

    for (qi, question) in questions.iter().enumerate() {
        if question.text_of_question.trim().is_empty() {
            return Err(ValidationFailure::new("question text must not be empty").at_question(qi));
        }
        if question.answers.len() < MIN_ANSWERS_PER_QUESTION {
            return Err(ValidationFailure::new(format!(
                "question must have at least {} answers",
                MIN_ANSWERS_PER_QUESTION
            ))
            .at_question(qi));
        }
        for (ai, answer) in question.answers.iter().enumerate() {
            if answer.text.trim().is_empty() {
                return Err(ValidationFailure::new("answer text must not be empty")
                    .at_question(qi)
                    .at_answer(ai));
            }
            if answer.score < 0 {
                return Err(ValidationFailure::new("answer score must not be negative")
                    .at_question(qi)
                    .at_answer(ai));
            }
            if answer.score > MAX_ANSWER_SCORE {
                return Err(ValidationFailure::new(format!(
                    "answer score must not exceed {}",
                    MAX_ANSWER_SCORE
                ))
                .at_question(qi)
                .at_answer(ai));
            }
        }
        if !question.answers.iter().any(|a| a.score > 0) {
            return Err(
                ValidationFailure::new("question must contain at least one correct answer")
                    .at_question(qi),
            );
        }
    }

    let mut max_total: i32 = 0;
    for (qi, question) in questions.iter().enumerate() {
        max_total = max_total.checked_add(question.max_points()).ok_or_else(|| {
            ValidationFailure::new("maximum achievable score is too large").at_question(qi)
        })?;
    }
    if header.min_point > max_total {
        return Err(ValidationFailure::new(format!(
            "minPoint {} exceeds the maximum achievable score {}",
            header.min_point, max_total
        )));
    }
    Ok(())
}
