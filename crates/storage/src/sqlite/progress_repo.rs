use lms_core::model::{
    CourseId, CourseProgress, LectureId, MarkTransition, QuizScoreEntry, UserId,
};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{map_lecture_progress_row, map_score_row, ser, string_vec_from_json,
        string_vec_to_json},
};
use crate::repository::{ProgressRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<Option<CourseProgress>, StorageError> {
        let user = user_id.to_string();
        let course = course_id.to_string();

        let lecture_rows = sqlx::query(
            r"
            SELECT lecture_id, marked, notes
            FROM lecture_progress
            WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(&user)
        .bind(&course)
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        let score_rows = sqlx::query(
            r"
            SELECT quiz_id, score, total_points, submitted_at
            FROM quiz_scores
            WHERE user_id = ?1 AND course_id = ?2
            ORDER BY id ASC
            ",
        )
        .bind(&user)
        .bind(&course)
        .fetch_all(self.pool())
        .await
        .map_err(conn)?;

        if lecture_rows.is_empty() && score_rows.is_empty() {
            return Ok(None);
        }

        let mut lectures = Vec::with_capacity(lecture_rows.len());
        for row in lecture_rows {
            lectures.push(map_lecture_progress_row(&row)?);
        }
        let mut scores = Vec::with_capacity(score_rows.len());
        for row in score_rows {
            scores.push(map_score_row(&row)?);
        }

        Ok(Some(CourseProgress::from_persisted(
            course_id, lectures, scores,
        )))
    }

    async fn set_lecture_mark(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        marked: bool,
    ) -> Result<MarkTransition, StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        let user = user_id.to_string();
        let course = course_id.to_string();
        let lecture = lecture_id.to_string();

        let existing = sqlx::query(
            r"
            SELECT marked FROM lecture_progress
            WHERE user_id = ?1 AND course_id = ?2 AND lecture_id = ?3
            ",
        )
        .bind(&user)
        .bind(&course)
        .bind(&lecture)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;

        let transition = match existing {
            None => {
                sqlx::query(
                    r"
                    INSERT INTO lecture_progress (user_id, course_id, lecture_id, marked)
                    VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(&user)
                .bind(&course)
                .bind(&lecture)
                .bind(i64::from(marked))
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
                MarkTransition {
                    previous: false,
                    changed: marked,
                }
            }
            Some(row) => {
                let previous = row.try_get::<i64, _>("marked").map_err(ser)? != 0;
                if previous != marked {
                    sqlx::query(
                        r"
                        UPDATE lecture_progress SET marked = ?4
                        WHERE user_id = ?1 AND course_id = ?2 AND lecture_id = ?3
                        ",
                    )
                    .bind(&user)
                    .bind(&course)
                    .bind(&lecture)
                    .bind(i64::from(marked))
                    .execute(&mut *tx)
                    .await
                    .map_err(conn)?;
                }
                MarkTransition {
                    previous,
                    changed: previous != marked,
                }
            }
        };

        tx.commit().await.map_err(conn)?;
        Ok(transition)
    }

    async fn add_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        note: &str,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        let user = user_id.to_string();
        let course = course_id.to_string();
        let lecture = lecture_id.to_string();

        let existing = sqlx::query(
            r"
            SELECT notes FROM lecture_progress
            WHERE user_id = ?1 AND course_id = ?2 AND lecture_id = ?3
            ",
        )
        .bind(&user)
        .bind(&course)
        .bind(&lecture)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;

        match existing {
            None => {
                let notes = string_vec_to_json(&[note.to_owned()])?;
                sqlx::query(
                    r"
                    INSERT INTO lecture_progress (user_id, course_id, lecture_id, marked, notes)
                    VALUES (?1, ?2, ?3, 0, ?4)
                    ",
                )
                .bind(&user)
                .bind(&course)
                .bind(&lecture)
                .bind(notes)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
            Some(row) => {
                let mut notes =
                    string_vec_from_json("notes", &row.try_get::<String, _>("notes").map_err(ser)?)?;
                notes.push(note.to_owned());
                sqlx::query(
                    r"
                    UPDATE lecture_progress SET notes = ?4
                    WHERE user_id = ?1 AND course_id = ?2 AND lecture_id = ?3
                    ",
                )
                .bind(&user)
                .bind(&course)
                .bind(&lecture)
                .bind(string_vec_to_json(&notes)?)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn remove_note(
        &self,
        user_id: UserId,
        course_id: CourseId,
        lecture_id: LectureId,
        index: usize,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        let user = user_id.to_string();
        let course = course_id.to_string();
        let lecture = lecture_id.to_string();

        let row = sqlx::query(
            r"
            SELECT notes FROM lecture_progress
            WHERE user_id = ?1 AND course_id = ?2 AND lecture_id = ?3
            ",
        )
        .bind(&user)
        .bind(&course)
        .bind(&lecture)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let mut notes =
            string_vec_from_json("notes", &row.try_get::<String, _>("notes").map_err(ser)?)?;
        if index >= notes.len() {
            return Err(StorageError::NotFound);
        }
        notes.remove(index);

        sqlx::query(
            r"
            UPDATE lecture_progress SET notes = ?4
            WHERE user_id = ?1 AND course_id = ?2 AND lecture_id = ?3
            ",
        )
        .bind(&user)
        .bind(&course)
        .bind(&lecture)
        .bind(string_vec_to_json(&notes)?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn append_quiz_score(
        &self,
        user_id: UserId,
        course_id: CourseId,
        entry: &QuizScoreEntry,
        retain: Option<u32>,
    ) -> Result<Option<u32>, StorageError> {
        let mut tx = self.pool().begin().await.map_err(conn)?;
        let user = user_id.to_string();
        let course = course_id.to_string();
        let quiz = entry.quiz_id().to_string();

        let previous = sqlx::query(
            r"
            SELECT score FROM quiz_scores
            WHERE user_id = ?1 AND course_id = ?2 AND quiz_id = ?3
            ORDER BY id DESC
            LIMIT 1
            ",
        )
        .bind(&user)
        .bind(&course)
        .bind(&quiz)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?
        .map(|row| {
            let score: i64 = row.try_get("score").map_err(ser)?;
            u32::try_from(score)
                .map_err(|_| StorageError::Serialization(format!("invalid score: {score}")))
        })
        .transpose()?;

        sqlx::query(
            r"
            INSERT INTO quiz_scores (user_id, course_id, quiz_id, score, total_points, submitted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(&user)
        .bind(&course)
        .bind(&quiz)
        .bind(i64::from(entry.score()))
        .bind(i64::from(entry.total_points()))
        .bind(entry.submitted_at())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if let Some(cap) = retain {
            sqlx::query(
                r"
                DELETE FROM quiz_scores
                WHERE user_id = ?1 AND course_id = ?2 AND quiz_id = ?3
                  AND id NOT IN (
                    SELECT id FROM quiz_scores
                    WHERE user_id = ?1 AND course_id = ?2 AND quiz_id = ?3
                    ORDER BY id DESC
                    LIMIT ?4
                  )
                ",
            )
            .bind(&user)
            .bind(&course)
            .bind(&quiz)
            .bind(i64::from(cap))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(previous)
    }
}
