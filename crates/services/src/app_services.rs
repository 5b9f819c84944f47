use std::sync::Arc;

use lms_core::model::EngineSettings;
use storage::repository::Storage;

use crate::badge_service::BadgeService;
use crate::catalog_service::CatalogService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::quiz_service::QuizService;
use crate::sequence_service::SequenceService;
use crate::Clock;

/// Assembles the engine's services over a shared storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    quizzes: Arc<QuizService>,
    badges: Arc<BadgeService>,
    sequences: Arc<SequenceService>,
    catalog: Arc<CatalogService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: EngineSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, settings))
    }

    /// Build services over the in-memory backend, for tests and prototyping.
    #[must_use]
    pub fn in_memory(clock: Clock, settings: EngineSettings) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, settings)
    }

    /// Wire services over an existing storage aggregate.
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, settings: EngineSettings) -> Self {
        let badges = Arc::new(BadgeService::new(
            clock,
            settings,
            Arc::clone(&storage.users),
            Arc::clone(&storage.badges),
        ));
        let progress = Arc::new(ProgressService::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.users),
            Arc::clone(&badges),
        ));
        let quizzes = Arc::new(QuizService::new(
            clock,
            settings,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.users),
            Arc::clone(&badges),
        ));
        let sequences = Arc::new(SequenceService::new(Arc::clone(&storage.catalog)));
        let catalog = Arc::new(CatalogService::new(Arc::clone(&storage.catalog)));

        Self {
            progress,
            quizzes,
            badges,
            sequences,
            catalog,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn quizzes(&self) -> Arc<QuizService> {
        Arc::clone(&self.quizzes)
    }

    #[must_use]
    pub fn badges(&self) -> Arc<BadgeService> {
        Arc::clone(&self.badges)
    }

    #[must_use]
    pub fn sequences(&self) -> Arc<SequenceService> {
        Arc::clone(&self.sequences)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }
}
