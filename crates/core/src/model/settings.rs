use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("quiz history limit must be > 0 when set")]
    InvalidQuizHistoryLimit,

    #[error("reconcile attempt budget must be > 0")]
    InvalidReconcileAttempts,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Deployment-level knobs for the progress engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    quiz_history_limit: Option<u32>,
    reconcile_max_attempts: u32,
}

impl EngineSettings {
    /// Creates the standard settings: unbounded quiz history (matching the
    /// original platform) and three reconciliation attempts.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            quiz_history_limit: None,
            reconcile_max_attempts: 3,
        }
    }

    /// Creates custom settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a zero limit or zero attempt budget is given.
    pub fn new(
        quiz_history_limit: Option<u32>,
        reconcile_max_attempts: u32,
    ) -> Result<Self, SettingsError> {
        if quiz_history_limit == Some(0) {
            return Err(SettingsError::InvalidQuizHistoryLimit);
        }
        if reconcile_max_attempts == 0 {
            return Err(SettingsError::InvalidReconcileAttempts);
        }

        Ok(Self {
            quiz_history_limit,
            reconcile_max_attempts,
        })
    }

    /// When set, only this many history entries are kept per quiz.
    #[must_use]
    pub fn quiz_history_limit(&self) -> Option<u32> {
        self.quiz_history_limit
    }

    /// How many times a conflicted badge reconciliation is retried before
    /// giving up.
    #[must_use]
    pub fn reconcile_max_attempts(&self) -> u32 {
        self.reconcile_max_attempts
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::standard()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
