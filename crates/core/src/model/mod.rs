mod badge;
mod course;
mod ids;
mod progress;
mod settings;

pub use ids::{BadgeId, CourseId, LectureId, ParseIdError, QuestionId, QuizId, UserId};

pub use badge::{Badge, BadgeChange, BadgeError, BadgeStatus};
pub use course::{
    Course, CourseError, Lecture, Question, Quiz, QuizError, SequenceItem, SequenceKind,
    DEFAULT_QUESTION_POINTS,
};
pub use progress::{
    CourseProgress, LectureProgress, MarkTransition, ProgressError, QuizScoreEntry,
    NOTE_MAX_CHARS,
};
pub use settings::{EngineSettings, SettingsError};
