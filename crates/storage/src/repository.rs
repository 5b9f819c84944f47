use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use lms_core::model::{
    Badge, BadgeId, Course, CourseId, CourseProgress, LectureId, MarkTransition, QuizScoreEntry,
    SequenceItem, UserId,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Snapshot of one user's gamification state, used by badge reconciliation.
///
/// `version` changes on every badge-set write; a conditional write against a
/// stale version fails with `StorageError::Conflict`.
#[derive(Debug, Clone)]
pub struct UserLedger {
    pub xp: i64,
    pub badges: HashSet<BadgeId>,
    pub version: u64,
}

/// One leaderboard row: a user, their XP, and the badge ids they hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub user_id: UserId,
    pub xp: i64,
    pub badge_ids: Vec<BadgeId>,
}

/// Repository contract for the course catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or replace a whole course aggregate.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Fetch a course aggregate by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError>;

    /// Replace a course's stored sequence all-or-nothing.
    ///
    /// Callers validate item targets first; the replacement itself is
    /// unconditional.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course does not exist.
    async fn set_sequence(
        &self,
        course_id: CourseId,
        items: &[SequenceItem],
    ) -> Result<(), StorageError>;
}

/// Repository contract for per-user course progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch one user's progress for one course, if they ever touched it.
    ///
    /// # Errors
    ///
    /// Returns storage errors; absence is `Ok(None)`.
    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError>;

    /// Atomically store a lecture mark, creating the course/lecture entries
    /// on first use, and report the previous flag and whether it changed.
    ///
    /// Writes for the same (user, course, lecture) key are linearized.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn set_lecture_mark(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        marked: bool,
    ) -> Result<MarkTransition, StorageError>;

    /// Append a note (already validated and trimmed) to a lecture, creating
    /// the entries on first use.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn add_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        note: &str,
    ) -> Result<(), StorageError>;

    /// Remove exactly the note at `index`, shifting later notes down.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when no note exists at that index
    /// (including when the lecture was never touched).
    async fn remove_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        index: usize,
    ) -> Result<(), StorageError>;

    /// Atomically append a quiz attempt and return the previous latest score
    /// for that quiz, if any.
    ///
    /// When `retain` is set, only the newest `retain` attempts per quiz are
    /// kept; older ones are dropped in the same write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn append_quiz_score(
        &self,
        user_id: UserId,
        course_id: CourseId,
        entry: &QuizScoreEntry,
        retain: Option<u32>,
    ) -> Result<Option<u32>, StorageError>;
}

/// Repository contract for user XP and badge holdings.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Apply an XP delta as a single atomic storage-level increment and
    /// return the new total. Never read-compute-write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn apply_xp_delta(&self, user_id: UserId, delta: i64) -> Result<i64, StorageError>;

    /// Current XP for a user (0 for a user never seen).
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn xp(&self, user_id: UserId) -> Result<i64, StorageError>;

    /// Snapshot XP, badge set, and badge version in one consistent read,
    /// creating the user record if needed.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn ledger_snapshot(&self, user_id: UserId) -> Result<UserLedger, StorageError>;

    /// Apply a badge grant/revoke diff in one conditional write.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user's badge version no longer
    /// matches `expected_version`; callers re-snapshot and retry.
    async fn apply_badge_diff(
        &self,
        user_id: UserId,
        expected_version: u64,
        grant: &[BadgeId],
        revoke: &[BadgeId],
    ) -> Result<(), StorageError>;

    /// Users ordered by XP descending (ties by id), with held badge ids.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StorageError>;
}

/// Repository contract for the badge catalog.
#[async_trait]
pub trait BadgeRepository: Send + Sync {
    /// Persist or update a badge.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the badge cannot be stored.
    async fn upsert_badge(&self, badge: &Badge) -> Result<(), StorageError>;

    /// All badges ordered by XP threshold ascending (ties by title).
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    async fn list_badges(&self) -> Result<Vec<Badge>, StorageError>;

    /// Delete a badge and purge it from every user's holdings.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such badge exists.
    async fn delete_badge(&self, id: BadgeId) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Debug, Default, Clone)]
struct UserState {
    xp: i64,
    badges: HashSet<BadgeId>,
    badge_version: u64,
}

#[derive(Default)]
struct Inner {
    courses: HashMap<CourseId, Course>,
    progress: HashMap<(UserId, CourseId), CourseProgress>,
    users: HashMap<UserId, UserState>,
    badges: HashMap<BadgeId, Badge>,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// One mutex over all state: every operation is a single critical section,
/// which trivially satisfies the per-key linearization requirements.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.courses.insert(course.id(), course.clone());
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let guard = self.lock()?;
        guard.courses.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn set_sequence(
        &self,
        course_id: CourseId,
        items: &[SequenceItem],
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let course = guard
            .courses
            .get_mut(&course_id)
            .ok_or(StorageError::NotFound)?;
        course.set_sequence(items.to_vec());
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.progress.get(&(user_id, course_id)).cloned())
    }

    async fn set_lecture_mark(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        marked: bool,
    ) -> Result<MarkTransition, StorageError> {
        let mut guard = self.lock()?;
        let progress = guard
            .progress
            .entry((user_id, course_id))
            .or_insert_with(|| CourseProgress::new(course_id));
        Ok(progress.lecture_entry(lecture_id).set_marked(marked))
    }

    async fn add_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        note: &str,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let progress = guard
            .progress
            .entry((user_id, course_id))
            .or_insert_with(|| CourseProgress::new(course_id));
        progress
            .lecture_entry(lecture_id)
            .add_note(note)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn remove_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        index: usize,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let progress = guard
            .progress
            .get_mut(&(user_id, course_id))
            .ok_or(StorageError::NotFound)?;
        let lecture = progress.lecture(lecture_id).ok_or(StorageError::NotFound)?;
        if index >= lecture.notes().len() {
            return Err(StorageError::NotFound);
        }
        progress
            .lecture_entry(lecture_id)
            .remove_note(index)
            .map(|_| ())
            .map_err(|_| StorageError::NotFound)
    }

    async fn append_quiz_score(
        &self,
        user_id: UserId,
        course_id: CourseId,
        entry: &QuizScoreEntry,
        retain: Option<u32>,
    ) -> Result<Option<u32>, StorageError> {
        let mut guard = self.lock()?;
        let progress = guard
            .progress
            .entry((user_id, course_id))
            .or_insert_with(|| CourseProgress::new(course_id));
        Ok(progress.append_quiz_score(entry.clone(), retain))
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn apply_xp_delta(&self, user_id: UserId, delta: i64) -> Result<i64, StorageError> {
        let mut guard = self.lock()?;
        let user = guard.users.entry(user_id).or_default();
        user.xp += delta;
        Ok(user.xp)
    }

    async fn xp(&self, user_id: UserId) -> Result<i64, StorageError> {
        let guard = self.lock()?;
        Ok(guard.users.get(&user_id).map_or(0, |u| u.xp))
    }

    async fn ledger_snapshot(&self, user_id: UserId) -> Result<UserLedger, StorageError> {
        let mut guard = self.lock()?;
        let user = guard.users.entry(user_id).or_default();
        Ok(UserLedger {
            xp: user.xp,
            badges: user.badges.clone(),
            version: user.badge_version,
        })
    }

    async fn apply_badge_diff(
        &self,
        user_id: UserId,
        expected_version: u64,
        grant: &[BadgeId],
        revoke: &[BadgeId],
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let user = guard.users.entry(user_id).or_default();
        if user.badge_version != expected_version {
            return Err(StorageError::Conflict);
        }
        for id in grant {
            user.badges.insert(*id);
        }
        for id in revoke {
            user.badges.remove(id);
        }
        user.badge_version += 1;
        Ok(())
    }

    async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardRow>, StorageError> {
        let guard = self.lock()?;
        let mut rows: Vec<LeaderboardRow> = guard
            .users
            .iter()
            .map(|(id, state)| {
                let mut badge_ids: Vec<BadgeId> = state.badges.iter().copied().collect();
                badge_ids.sort();
                LeaderboardRow {
                    user_id: *id,
                    xp: state.xp,
                    badge_ids,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.xp.cmp(&a.xp).then_with(|| a.user_id.cmp(&b.user_id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl BadgeRepository for InMemoryRepository {
    async fn upsert_badge(&self, badge: &Badge) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.badges.insert(badge.id(), badge.clone());
        Ok(())
    }

    async fn list_badges(&self) -> Result<Vec<Badge>, StorageError> {
        let guard = self.lock()?;
        let mut badges: Vec<Badge> = guard.badges.values().cloned().collect();
        badges.sort_by(|a, b| {
            a.xp_threshold()
                .cmp(&b.xp_threshold())
                .then_with(|| a.title().cmp(b.title()))
        });
        Ok(badges)
    }

    async fn delete_badge(&self, id: BadgeId) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard.badges.remove(&id).is_none() {
            return Err(StorageError::NotFound);
        }
        // Purge holdings so user badge sets never reference a dead catalog
        // entry; holders' versions move so in-flight reconciles conflict.
        for user in guard.users.values_mut() {
            if user.badges.remove(&id) {
                user.badge_version += 1;
            }
        }
        Ok(())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the engine's repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub users: Arc<dyn UserRepository>,
    pub badges: Arc<dyn BadgeRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let users: Arc<dyn UserRepository> = Arc::new(repo.clone());
        let badges: Arc<dyn BadgeRepository> = Arc::new(repo);
        Self {
            catalog,
            progress,
            users,
            badges,
        }
    }
}
