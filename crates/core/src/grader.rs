//! Pure quiz grading.
//!
//! Scores a submitted answer set against a quiz definition. The grader does
//! no I/O and no logging; callers decide what to do with unmatched answers
//! and are handed the per-question breakdown.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Question, QuestionId, Quiz};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraderError {
    /// The stored definition is internally inconsistent: a question's
    /// correct answer is not among its options. Construction rejects this,
    /// but persisted definitions may predate the rule.
    #[error("question {question_id}: correct answer {answer:?} is not one of its options")]
    CorrectAnswerNotInOptions {
        question_id: QuestionId,
        answer: String,
    },
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

/// One answer in a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: QuestionId,
    pub answer: String,
}

impl SubmittedAnswer {
    #[must_use]
    pub fn new(question_id: QuestionId, answer: impl Into<String>) -> Self {
        Self {
            question_id,
            answer: answer.into(),
        }
    }
}

/// Per-question grading detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub correct: bool,
    pub points_awarded: u32,
}

/// Result of grading one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeOutcome {
    /// Sum of points over correctly answered questions.
    pub score: u32,
    /// Sum of points over every question in the definition, answered or not.
    pub total_points: u32,
    pub per_question: Vec<QuestionResult>,
    /// Submitted question ids with no matching question in the definition.
    /// These are skipped, not scored; callers log them.
    pub unmatched: Vec<QuestionId>,
}

//
// ─── GRADING ───────────────────────────────────────────────────────────────────
//

/// Grades `answers` against `quiz`.
///
/// A question is correct iff the submitted answer matches the definition's
/// correct answer case-insensitively (both sides trimmed).
///
/// # Errors
///
/// Returns `GraderError::CorrectAnswerNotInOptions` if any question in the
/// definition is internally invalid — checked for the whole definition
/// before anything is scored.
pub fn grade(quiz: &Quiz, answers: &[SubmittedAnswer]) -> Result<GradeOutcome, GraderError> {
    for question in quiz.questions() {
        if !question
            .options()
            .iter()
            .any(|o| o == question.correct_answer())
        {
            return Err(GraderError::CorrectAnswerNotInOptions {
                question_id: question.id(),
                answer: question.correct_answer().to_owned(),
            });
        }
    }

    let by_id: HashMap<QuestionId, &Question> =
        quiz.questions().iter().map(|q| (q.id(), q)).collect();

    let mut score = 0;
    let mut per_question = Vec::with_capacity(answers.len());
    let mut unmatched = Vec::new();

    for answer in answers {
        let Some(question) = by_id.get(&answer.question_id) else {
            unmatched.push(answer.question_id);
            continue;
        };

        let correct = answers_match(&answer.answer, question.correct_answer());
        let points_awarded = if correct { question.points() } else { 0 };
        score += points_awarded;
        per_question.push(QuestionResult {
            question_id: answer.question_id,
            correct,
            points_awarded,
        });
    }

    Ok(GradeOutcome {
        score,
        total_points: quiz.total_points(),
        per_question,
        unmatched,
    })
}

fn answers_match(submitted: &str, correct: &str) -> bool {
    submitted.trim().to_lowercase() == correct.trim().to_lowercase()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuizId, QuizError};

    fn build_quiz(questions: Vec<Question>) -> Quiz {
        Quiz::new(QuizId::generate(), "Checkpoint", None, questions).unwrap()
    }

    fn question(text: &str, correct: &str, points: u32) -> Question {
        Question::new(
            QuestionId::generate(),
            text,
            vec![correct.to_owned(), "wrong".to_owned()],
            correct,
            points,
        )
        .unwrap()
    }

    #[test]
    fn matching_is_case_insensitive() {
        let q = question("Capital of France?", "Paris", 5);
        let id = q.id();
        let quiz = build_quiz(vec![q]);

        let outcome = grade(&quiz, &[SubmittedAnswer::new(id, "  pArIs ")]).unwrap();
        assert_eq!(outcome.score, 5);
        assert!(outcome.per_question[0].correct);
    }

    #[test]
    fn total_points_covers_unanswered_questions() {
        let q1 = question("a?", "a", 5);
        let q2 = question("b?", "b", 5);
        let id1 = q1.id();
        let quiz = build_quiz(vec![q1, q2]);

        let outcome = grade(&quiz, &[SubmittedAnswer::new(id1, "a")]).unwrap();
        assert_eq!(outcome.score, 5);
        assert_eq!(outcome.total_points, 10);
    }

    #[test]
    fn unmatched_question_ids_are_skipped_not_scored() {
        let q = question("a?", "a", 5);
        let quiz = build_quiz(vec![q]);
        let stray = QuestionId::generate();

        let outcome = grade(&quiz, &[SubmittedAnswer::new(stray, "a")]).unwrap();
        assert_eq!(outcome.score, 0);
        assert!(outcome.per_question.is_empty());
        assert_eq!(outcome.unmatched, [stray]);
    }

    #[test]
    fn wrong_answer_awards_zero_points() {
        let q = question("a?", "a", 3);
        let id = q.id();
        let quiz = build_quiz(vec![q]);

        let outcome = grade(&quiz, &[SubmittedAnswer::new(id, "nope")]).unwrap();
        assert_eq!(outcome.score, 0);
        assert_eq!(
            outcome.per_question,
            [QuestionResult {
                question_id: id,
                correct: false,
                points_awarded: 0
            }]
        );
    }

    #[test]
    fn inconsistent_definition_is_a_conflict() {
        // from_persisted bypasses the options check, as legacy rows can.
        let q = Question::from_persisted(
            QuestionId::generate(),
            "a?".to_owned(),
            vec!["x".to_owned(), "y".to_owned()],
            "z".to_owned(),
            1,
        );
        let id = q.id();
        let quiz = build_quiz(vec![q]);

        let err = grade(&quiz, &[]).unwrap_err();
        assert_eq!(
            err,
            GraderError::CorrectAnswerNotInOptions {
                question_id: id,
                answer: "z".to_owned()
            }
        );
    }

    #[test]
    fn empty_submission_scores_zero() {
        let quiz = build_quiz(vec![question("a?", "a", 2)]);
        let outcome = grade(&quiz, &[]).unwrap();
        assert_eq!(outcome.score, 0);
        assert_eq!(outcome.total_points, 2);
    }

    #[test]
    fn quiz_title_bounds_still_enforced_at_construction() {
        let err = Quiz::new(QuizId::generate(), "ab", None, Vec::new()).unwrap_err();
        assert_eq!(err, QuizError::InvalidTitle);
    }
}
