use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LectureId, QuestionId, QuizId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course title must be between 5 and 50 characters")]
    InvalidTitle,

    #[error("lecture name cannot be empty")]
    EmptyLectureName,

    #[error("sequence references unknown {kind} {content_id}")]
    SequenceTargetMissing {
        kind: SequenceKind,
        content_id: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz title must be between 3 and 100 characters")]
    InvalidTitle,

    #[error("quiz description cannot exceed 500 characters")]
    DescriptionTooLong,

    #[error("question text cannot be empty")]
    EmptyQuestionText,

    #[error("a question needs at least two options (got {count})")]
    TooFewOptions { count: usize },

    #[error("correct answer {answer:?} is not one of the question's options")]
    CorrectAnswerNotInOptions { answer: String },
}

//
// ─── LECTURE ───────────────────────────────────────────────────────────────────
//

/// A single lecture belonging to a course.
///
/// Video/thumbnail assets live in the media layer; the catalog only carries
/// the descriptive fields the progress engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lecture {
    id: LectureId,
    name: String,
    description: Option<String>,
}

impl Lecture {
    /// Creates a new lecture.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::EmptyLectureName` if the name is empty or
    /// whitespace-only.
    pub fn new(
        id: LectureId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Self, CourseError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CourseError::EmptyLectureName);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            name: name.trim().to_owned(),
            description,
        })
    }

    /// Rebuild a lecture from storage without re-validating.
    #[must_use]
    pub fn from_persisted(id: LectureId, name: String, description: Option<String>) -> Self {
        Self {
            id,
            name,
            description,
        }
    }

    #[must_use]
    pub fn id(&self) -> LectureId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question inside a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    correct_answer: String,
    points: u32,
}

/// Default point value for a question when none is supplied.
pub const DEFAULT_QUESTION_POINTS: u32 = 1;

impl Question {
    /// Creates a new question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the text is empty, fewer than two options are
    /// given, or the correct answer is not one of the options.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        points: u32,
    ) -> Result<Self, QuizError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuizError::EmptyQuestionText);
        }
        if options.len() < 2 {
            return Err(QuizError::TooFewOptions {
                count: options.len(),
            });
        }
        let correct_answer = correct_answer.into();
        if !options.contains(&correct_answer) {
            return Err(QuizError::CorrectAnswerNotInOptions {
                answer: correct_answer,
            });
        }

        Ok(Self {
            id,
            text: text.trim().to_owned(),
            options,
            correct_answer,
            points,
        })
    }

    /// Rebuild a question from storage without structural validation.
    ///
    /// Stored definitions may predate the answer-in-options rule; the grader
    /// re-checks it before scoring.
    #[must_use]
    pub fn from_persisted(
        id: QuestionId,
        text: String,
        options: Vec<String>,
        correct_answer: String,
        points: u32,
    ) -> Self {
        Self {
            id,
            text,
            options,
            correct_answer,
            points,
        }
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// A quiz belonging to a course: an ordered list of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    id: QuizId,
    title: String,
    description: Option<String>,
    questions: Vec<Question>,
}

impl Quiz {
    /// Creates a new quiz.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::InvalidTitle` for a title outside 3..=100 chars
    /// (after trimming) and `QuizError::DescriptionTooLong` past 500 chars.
    pub fn new(
        id: QuizId,
        title: impl Into<String>,
        description: Option<String>,
        questions: Vec<Question>,
    ) -> Result<Self, QuizError> {
        let title = title.into();
        let trimmed = title.trim();
        if !(3..=100).contains(&trimmed.chars().count()) {
            return Err(QuizError::InvalidTitle);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());
        if let Some(desc) = &description {
            if desc.chars().count() > 500 {
                return Err(QuizError::DescriptionTooLong);
            }
        }

        Ok(Self {
            id,
            title: trimmed.to_owned(),
            description,
            questions,
        })
    }

    /// Rebuild a quiz from storage without re-validating.
    #[must_use]
    pub fn from_persisted(
        id: QuizId,
        title: String,
        description: Option<String>,
        questions: Vec<Question>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            questions,
        }
    }

    #[must_use]
    pub fn id(&self) -> QuizId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Sum of point values over every question in the definition.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(Question::points).sum()
    }

    pub fn add_question(&mut self, question: Question) {
        self.questions.push(question);
    }

    /// Replaces the question with the same id, or appends it if absent.
    pub fn upsert_question(&mut self, question: Question) {
        match self.questions.iter_mut().find(|q| q.id == question.id) {
            Some(slot) => *slot = question,
            None => self.questions.push(question),
        }
    }

    /// Removes a question by id; returns whether it was present.
    pub fn remove_question(&mut self, id: QuestionId) -> bool {
        let before = self.questions.len();
        self.questions.retain(|q| q.id != id);
        self.questions.len() != before
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

//
// ─── COURSE SEQUENCE ───────────────────────────────────────────────────────────
//

/// Kind of content a sequence slot points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Video,
    Quiz,
}

impl SequenceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceKind::Video => "video",
            SequenceKind::Quiz => "quiz",
        }
    }
}

impl std::fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slot in a course's display order, referencing a lecture or a quiz.
///
/// Membership of the target in the course is enforced when the sequence is
/// written, not when it is read; a target deleted later resolves to a
/// placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SequenceItem {
    Video { content_id: LectureId },
    Quiz { content_id: QuizId },
}

impl SequenceItem {
    #[must_use]
    pub fn kind(&self) -> SequenceKind {
        match self {
            SequenceItem::Video { .. } => SequenceKind::Video,
            SequenceItem::Quiz { .. } => SequenceKind::Quiz,
        }
    }

    /// The referenced id, stringified for display and storage.
    #[must_use]
    pub fn content_id(&self) -> String {
        match self {
            SequenceItem::Video { content_id } => content_id.to_string(),
            SequenceItem::Quiz { content_id } => content_id.to_string(),
        }
    }
}

//
// ─── COURSE ────────────────────────────────────────────────────────────────────
//

/// Catalog aggregate: a course with its lectures, quizzes, and display
/// sequence.
///
/// Lectures and quizzes are held in id-keyed maps so lookups during grading
/// and sequence resolution are O(1); presentation order comes from the
/// sequence, not from the maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    id: CourseId,
    title: String,
    lectures: HashMap<LectureId, Lecture>,
    quizzes: HashMap<QuizId, Quiz>,
    sequence: Vec<SequenceItem>,
}

impl Course {
    /// Creates an empty course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::InvalidTitle` for a title outside 5..=50 chars
    /// after trimming.
    pub fn new(id: CourseId, title: impl Into<String>) -> Result<Self, CourseError> {
        let title = title.into();
        let trimmed = title.trim();
        if !(5..=50).contains(&trimmed.chars().count()) {
            return Err(CourseError::InvalidTitle);
        }

        Ok(Self {
            id,
            title: trimmed.to_owned(),
            lectures: HashMap::new(),
            quizzes: HashMap::new(),
            sequence: Vec::new(),
        })
    }

    /// Rebuild a course aggregate from storage.
    #[must_use]
    pub fn from_persisted(
        id: CourseId,
        title: String,
        lectures: Vec<Lecture>,
        quizzes: Vec<Quiz>,
        sequence: Vec<SequenceItem>,
    ) -> Self {
        Self {
            id,
            title,
            lectures: lectures.into_iter().map(|l| (l.id(), l)).collect(),
            quizzes: quizzes.into_iter().map(|q| (q.id(), q)).collect(),
            sequence,
        }
    }

    #[must_use]
    pub fn id(&self) -> CourseId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn lecture(&self, id: LectureId) -> Option<&Lecture> {
        self.lectures.get(&id)
    }

    pub fn lectures(&self) -> impl Iterator<Item = &Lecture> {
        self.lectures.values()
    }

    pub fn add_lecture(&mut self, lecture: Lecture) {
        self.lectures.insert(lecture.id(), lecture);
    }

    /// Removes a lecture by id; returns whether it was present.
    ///
    /// Sequence slots referencing it are left dangling on purpose — the
    /// resolver substitutes a placeholder.
    pub fn remove_lecture(&mut self, id: LectureId) -> bool {
        self.lectures.remove(&id).is_some()
    }

    #[must_use]
    pub fn quiz(&self, id: QuizId) -> Option<&Quiz> {
        self.quizzes.get(&id)
    }

    #[must_use]
    pub fn quiz_mut(&mut self, id: QuizId) -> Option<&mut Quiz> {
        self.quizzes.get_mut(&id)
    }

    pub fn quizzes(&self) -> impl Iterator<Item = &Quiz> {
        self.quizzes.values()
    }

    pub fn add_quiz(&mut self, quiz: Quiz) {
        self.quizzes.insert(quiz.id(), quiz);
    }

    /// Removes a quiz by id; returns whether it was present.
    pub fn remove_quiz(&mut self, id: QuizId) -> bool {
        self.quizzes.remove(&id).is_some()
    }

    #[must_use]
    pub fn sequence(&self) -> &[SequenceItem] {
        &self.sequence
    }

    /// Checks that every sequence item references content of this course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::SequenceTargetMissing` for the first item whose
    /// target is not part of the course.
    pub fn validate_sequence(&self, items: &[SequenceItem]) -> Result<(), CourseError> {
        for item in items {
            let known = match item {
                SequenceItem::Video { content_id } => self.lectures.contains_key(content_id),
                SequenceItem::Quiz { content_id } => self.quizzes.contains_key(content_id),
            };
            if !known {
                return Err(CourseError::SequenceTargetMissing {
                    kind: item.kind(),
                    content_id: item.content_id(),
                });
            }
        }
        Ok(())
    }

    /// Replaces the stored sequence wholesale.
    ///
    /// Callers are expected to run `validate_sequence` first; this setter is
    /// also used when loading persisted sequences that may contain dangling
    /// references.
    pub fn set_sequence(&mut self, items: Vec<SequenceItem>) {
        self.sequence = items;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, correct: &str, points: u32) -> Question {
        Question::new(
            QuestionId::generate(),
            text,
            vec![correct.to_owned(), "other".to_owned()],
            correct,
            points,
        )
        .unwrap()
    }

    #[test]
    fn course_new_rejects_short_title() {
        let err = Course::new(CourseId::generate(), "Ohm").unwrap_err();
        assert_eq!(err, CourseError::InvalidTitle);
    }

    #[test]
    fn lecture_new_rejects_empty_name() {
        let err = Lecture::new(LectureId::generate(), "   ", None).unwrap_err();
        assert_eq!(err, CourseError::EmptyLectureName);
    }

    #[test]
    fn question_requires_correct_answer_among_options() {
        let err = Question::new(
            QuestionId::generate(),
            "2 + 2?",
            vec!["3".to_owned(), "4".to_owned()],
            "5",
            1,
        )
        .unwrap_err();
        assert!(matches!(err, QuizError::CorrectAnswerNotInOptions { .. }));
    }

    #[test]
    fn question_requires_two_options() {
        let err = Question::new(
            QuestionId::generate(),
            "2 + 2?",
            vec!["4".to_owned()],
            "4",
            1,
        )
        .unwrap_err();
        assert_eq!(err, QuizError::TooFewOptions { count: 1 });
    }

    #[test]
    fn quiz_total_points_sums_questions() {
        let quiz = Quiz::new(
            QuizId::generate(),
            "Basics",
            None,
            vec![question("a?", "a", 5), question("b?", "b", 5)],
        )
        .unwrap();
        assert_eq!(quiz.total_points(), 10);
    }

    #[test]
    fn quiz_upsert_question_replaces_in_place() {
        let q = question("a?", "a", 1);
        let id = q.id();
        let mut quiz = Quiz::new(QuizId::generate(), "Basics", None, vec![q]).unwrap();

        let replacement = Question::new(
            id,
            "a?",
            vec!["a".to_owned(), "b".to_owned()],
            "a",
            3,
        )
        .unwrap();
        quiz.upsert_question(replacement);

        assert_eq!(quiz.questions().len(), 1);
        assert_eq!(quiz.total_points(), 3);
    }

    #[test]
    fn validate_sequence_flags_unknown_targets() {
        let mut course = Course::new(CourseId::generate(), "Rust Fundamentals").unwrap();
        let lecture = Lecture::new(LectureId::generate(), "Intro", None).unwrap();
        let lecture_id = lecture.id();
        course.add_lecture(lecture);

        course
            .validate_sequence(&[SequenceItem::Video {
                content_id: lecture_id,
            }])
            .unwrap();

        let missing = QuizId::generate();
        let err = course
            .validate_sequence(&[SequenceItem::Quiz {
                content_id: missing,
            }])
            .unwrap_err();
        assert_eq!(
            err,
            CourseError::SequenceTargetMissing {
                kind: SequenceKind::Quiz,
                content_id: missing.to_string(),
            }
        );
    }
}
