use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, LectureId, QuizId};

/// Maximum length of a single lecture note, in characters.
pub const NOTE_MAX_CHARS: usize = 200;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("note exceeds {NOTE_MAX_CHARS} characters (got {len})")]
    NoteTooLong { len: usize },

    #[error("no note exists at index {index} (have {len})")]
    NoteIndexOutOfRange { index: usize, len: usize },

    #[error("quiz score {score} exceeds total points {total_points}")]
    ScoreExceedsTotal { score: u32, total_points: u32 },
}

//
// ─── LECTURE PROGRESS ──────────────────────────────────────────────────────────
//

/// Outcome of a mark write: the flag that was stored before, and whether the
/// write changed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkTransition {
    pub previous: bool,
    pub changed: bool,
}

/// One user's completion flag and notes for a single lecture.
///
/// Created lazily on the first mark or note; mutated in place afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LectureProgress {
    lecture_id: LectureId,
    marked: bool,
    notes: Vec<String>,
}

impl LectureProgress {
    #[must_use]
    pub fn new(lecture_id: LectureId) -> Self {
        Self {
            lecture_id,
            marked: false,
            notes: Vec::new(),
        }
    }

    /// Rebuild from storage.
    #[must_use]
    pub fn from_persisted(lecture_id: LectureId, marked: bool, notes: Vec<String>) -> Self {
        Self {
            lecture_id,
            marked,
            notes,
        }
    }

    #[must_use]
    pub fn lecture_id(&self) -> LectureId {
        self.lecture_id
    }

    #[must_use]
    pub fn marked(&self) -> bool {
        self.marked
    }

    #[must_use]
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Stores the new flag and reports the transition.
    pub fn set_marked(&mut self, marked: bool) -> MarkTransition {
        let previous = self.marked;
        self.marked = marked;
        MarkTransition {
            previous,
            changed: previous != marked,
        }
    }

    /// Appends a note, trimmed, keeping insertion order.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoteTooLong` past `NOTE_MAX_CHARS` characters.
    pub fn add_note(&mut self, note: impl Into<String>) -> Result<(), ProgressError> {
        let note = note.into().trim().to_owned();
        let len = note.chars().count();
        if len > NOTE_MAX_CHARS {
            return Err(ProgressError::NoteTooLong { len });
        }
        self.notes.push(note);
        Ok(())
    }

    /// Removes exactly the note at `index`, shifting later notes down.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoteIndexOutOfRange` if no note exists there.
    pub fn remove_note(&mut self, index: usize) -> Result<String, ProgressError> {
        if index >= self.notes.len() {
            return Err(ProgressError::NoteIndexOutOfRange {
                index,
                len: self.notes.len(),
            });
        }
        Ok(self.notes.remove(index))
    }
}

//
// ─── QUIZ SCORES ───────────────────────────────────────────────────────────────
//

/// One graded quiz attempt. History entries are append-only and never
/// mutated after the fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizScoreEntry {
    quiz_id: QuizId,
    score: u32,
    total_points: u32,
    submitted_at: DateTime<Utc>,
}

impl QuizScoreEntry {
    /// Creates a history entry.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::ScoreExceedsTotal` if `score > total_points`.
    pub fn new(
        quiz_id: QuizId,
        score: u32,
        total_points: u32,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if score > total_points {
            return Err(ProgressError::ScoreExceedsTotal {
                score,
                total_points,
            });
        }
        Ok(Self {
            quiz_id,
            score,
            total_points,
            submitted_at,
        })
    }

    #[must_use]
    pub fn quiz_id(&self) -> QuizId {
        self.quiz_id
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.total_points
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

//
// ─── COURSE PROGRESS ───────────────────────────────────────────────────────────
//

/// One user's progress through one purchased course: per-lecture state plus
/// the quiz attempt history.
///
/// Lecture entries are keyed by id for O(1) access; quiz history keeps
/// submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    course_id: CourseId,
    lectures: HashMap<LectureId, LectureProgress>,
    quiz_scores: Vec<QuizScoreEntry>,
}

impl CourseProgress {
    #[must_use]
    pub fn new(course_id: CourseId) -> Self {
        Self {
            course_id,
            lectures: HashMap::new(),
            quiz_scores: Vec::new(),
        }
    }

    /// Rebuild from storage.
    #[must_use]
    pub fn from_persisted(
        course_id: CourseId,
        lectures: Vec<LectureProgress>,
        quiz_scores: Vec<QuizScoreEntry>,
    ) -> Self {
        Self {
            course_id,
            lectures: lectures.into_iter().map(|l| (l.lecture_id(), l)).collect(),
            quiz_scores,
        }
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn lecture(&self, id: LectureId) -> Option<&LectureProgress> {
        self.lectures.get(&id)
    }

    pub fn lectures(&self) -> impl Iterator<Item = &LectureProgress> {
        self.lectures.values()
    }

    /// Returns the lecture entry, creating it on first touch.
    pub fn lecture_entry(&mut self, id: LectureId) -> &mut LectureProgress {
        self.lectures
            .entry(id)
            .or_insert_with(|| LectureProgress::new(id))
    }

    #[must_use]
    pub fn quiz_scores(&self) -> &[QuizScoreEntry] {
        &self.quiz_scores
    }

    /// Score of the most recent prior attempt at this quiz, if any.
    #[must_use]
    pub fn latest_quiz_score(&self, quiz_id: QuizId) -> Option<u32> {
        self.quiz_scores
            .iter()
            .rev()
            .find(|e| e.quiz_id() == quiz_id)
            .map(QuizScoreEntry::score)
    }

    /// Appends an attempt and returns the previous latest score for that
    /// quiz.
    ///
    /// When `retain` is set, only the newest `retain` entries for that quiz
    /// survive; the oldest beyond the cap are dropped in the same call.
    /// Surviving entries are never rewritten.
    pub fn append_quiz_score(
        &mut self,
        entry: QuizScoreEntry,
        retain: Option<u32>,
    ) -> Option<u32> {
        let quiz_id = entry.quiz_id();
        let previous = self.latest_quiz_score(quiz_id);
        self.quiz_scores.push(entry);

        if let Some(cap) = retain {
            let count = self
                .quiz_scores
                .iter()
                .filter(|e| e.quiz_id() == quiz_id)
                .count();
            let mut excess = count.saturating_sub(cap as usize);
            if excess > 0 {
                self.quiz_scores.retain(|e| {
                    if e.quiz_id() == quiz_id && excess > 0 {
                        excess -= 1;
                        false
                    } else {
                        true
                    }
                });
            }
        }

        previous
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
