#![forbid(unsafe_code)]

pub mod app_services;
pub mod badge_service;
pub mod catalog_service;
pub mod error;
pub mod progress_service;
pub mod quiz_service;
pub mod sequence_service;

pub use lms_core::Clock;

pub use app_services::AppServices;
pub use badge_service::{BadgeOutcome, BadgeService, LeaderboardEntry};
pub use catalog_service::CatalogService;
pub use error::{
    AppServicesError, BadgeServiceError, CatalogServiceError, NotFound, ProgressServiceError,
    QuizServiceError, SequenceServiceError, ValidationError,
};
pub use progress_service::{LectureMarkResult, ProgressService};
pub use quiz_service::{QuizService, QuizSubmissionResult};
pub use sequence_service::{ResolvedSequenceItem, SequenceService, CONTENT_NOT_FOUND};
