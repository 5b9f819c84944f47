//! Shared error types for the services crate.
//!
//! `NotFound` and `ValidationError` are detected before any mutation;
//! `GraderError` (an internally invalid quiz definition) is the conflict
//! class; `StorageError` carries the retryable/internal failures.

use thiserror::Error;

use lms_core::grader::GraderError;
use lms_core::model::{
    BadgeError, BadgeId, CourseError, CourseId, LectureId, ProgressError, QuestionId, QuizError,
    QuizId, SequenceKind, SettingsError, UserId, NOTE_MAX_CHARS,
};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// A referenced entity does not exist. Always detected before any mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFound {
    #[error("course {0} not found")]
    Course(CourseId),

    #[error("lecture {0} not found in this course")]
    Lecture(LectureId),

    #[error("quiz {0} not found in this course")]
    Quiz(QuizId),

    #[error("question {0} not found in this quiz")]
    Question(QuestionId),

    #[error("user {user_id} has no progress for course {course_id}")]
    Progress {
        user_id: UserId,
        course_id: CourseId,
    },

    #[error("badge {0} not found")]
    Badge(BadgeId),
}

/// Malformed input, rejected before any state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("note exceeds {max} characters (got {len})", max = NOTE_MAX_CHARS)]
    NoteTooLong { len: usize },

    #[error("no note exists at index {index}")]
    NoteIndexOutOfRange { index: usize },

    #[error("answers contain more than one entry for question {0}")]
    DuplicateAnswer(QuestionId),

    #[error("sequence references unknown {kind} {content_id}")]
    SequenceTargetMissing {
        kind: SequenceKind,
        content_id: String,
    },
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The stored quiz definition is internally inconsistent.
    #[error("invalid quiz definition: {0}")]
    Definition(#[from] GraderError),
    #[error(transparent)]
    Score(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `BadgeService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BadgeServiceError {
    #[error(transparent)]
    Badge(#[from] BadgeError),
    #[error(transparent)]
    NotFound(#[from] NotFound),
    /// Every conditional write lost its version race within the attempt
    /// budget. The XP ledger is committed; badge state lags until the next
    /// reconciliation.
    #[error("badge reconciliation conflicted {attempts} times; giving up")]
    ReconcileContention { attempts: u32 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SequenceService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SequenceServiceError {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogServiceError {
    #[error(transparent)]
    NotFound(#[from] NotFound),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
