use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use lms_core::model::{CourseId, CourseProgress, LectureId, UserId, NOTE_MAX_CHARS};
use storage::repository::{
    CatalogRepository, ProgressRepository, StorageError, UserRepository,
};

use crate::badge_service::{BadgeOutcome, BadgeService};
use crate::error::{NotFound, ProgressServiceError, ValidationError};

/// Result of a lecture mark write: the new XP total and the badge pass that
/// followed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LectureMarkResult {
    /// Whether the stored flag actually changed (repeat calls are no-ops).
    pub changed: bool,
    pub xp: i64,
    pub badges: BadgeOutcome,
}

/// Orchestrates lecture marks, notes, and progress reads.
#[derive(Clone)]
pub struct ProgressService {
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
    users: Arc<dyn UserRepository>,
    badges: Arc<BadgeService>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressRepository>,
        users: Arc<dyn UserRepository>,
        badges: Arc<BadgeService>,
    ) -> Self {
        Self {
            catalog,
            progress,
            users,
            badges,
        }
    }

    /// One user's progress for one course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Progress` if the user never touched the course.
    pub async fn get_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress, ProgressServiceError> {
        self.progress
            .get_course_progress(user_id, course_id)
            .await?
            .ok_or_else(|| {
                NotFound::Progress {
                    user_id,
                    course_id,
                }
                .into()
            })
    }

    /// Store a lecture completion flag and apply the XP/badge flow.
    ///
    /// XP moves only on an actual transition: `+gain_xp` when marking,
    /// `-gain_xp` when unmarking, nothing on a repeat. Badge reconciliation
    /// runs on every call so drift left by an earlier degraded success is
    /// healed on the next request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the course or lecture is unknown to the
    /// catalog — checked before anything is written — or storage errors.
    pub async fn set_lecture_mark(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        marked: bool,
        gain_xp: u32,
    ) -> Result<LectureMarkResult, ProgressServiceError> {
        let course = self.load_course(course_id).await?;
        if course.lecture(lecture_id).is_none() {
            return Err(NotFound::Lecture(lecture_id).into());
        }

        let transition = self
            .progress
            .set_lecture_mark(user_id, course_id, lecture_id, marked)
            .await?;

        let delta = if transition.changed {
            let gain = i64::from(gain_xp);
            if marked { gain } else { -gain }
        } else {
            0
        };

        let xp = if delta == 0 {
            self.users.xp(user_id).await?
        } else {
            self.users.apply_xp_delta(user_id, delta).await?
        };
        debug!(%user_id, %lecture_id, marked, delta, xp, "lecture mark updated");

        let badges = self.badges.reconcile_outcome(user_id).await;

        Ok(LectureMarkResult {
            changed: transition.changed,
            xp,
            badges,
        })
    }

    /// Append a free-text note to a lecture, creating progress entries on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NoteTooLong` past 200 characters (after
    /// trimming); nothing is stored in that case.
    pub async fn add_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        note: &str,
    ) -> Result<(), ProgressServiceError> {
        let trimmed = note.trim();
        let len = trimmed.chars().count();
        if len > NOTE_MAX_CHARS {
            return Err(ValidationError::NoteTooLong { len }.into());
        }

        self.progress
            .add_note(user_id, course_id, lecture_id, trimmed)
            .await?;
        Ok(())
    }

    /// Remove exactly the note at `index`, shifting later notes down.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NoteIndexOutOfRange` when no note exists at
    /// that index.
    pub async fn remove_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        index: usize,
    ) -> Result<(), ProgressServiceError> {
        match self
            .progress
            .remove_note(user_id, course_id, lecture_id, index)
            .await
        {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound) => {
                Err(ValidationError::NoteIndexOutOfRange { index }.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn load_course(
        &self,
        course_id: CourseId,
    ) -> Result<lms_core::model::Course, ProgressServiceError> {
        match self.catalog.get_course(course_id).await {
            Ok(course) => Ok(course),
            Err(StorageError::NotFound) => Err(NotFound::Course(course_id).into()),
            Err(err) => Err(err.into()),
        }
    }
}
