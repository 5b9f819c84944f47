use std::collections::HashMap;

use lms_core::model::{
    Course, CourseId, Lecture, LectureId, Question, Quiz, QuizId, SequenceItem,
};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{kind_to_str, map_question_id, sequence_item_from_parts, ser, string_vec_from_json,
        string_vec_to_json, uuid_from_text, points_from_i64},
};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let course_id = course.id().to_string();

        sqlx::query(
            r"
            INSERT INTO courses (id, title)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(&course_id)
        .bind(course.title())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Children are replaced wholesale; deleting quizzes cascades to
        // their questions.
        for table in ["lectures", "quizzes", "course_sequence"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE course_id = ?1"))
                .bind(&course_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        for lecture in course.lectures() {
            sqlx::query(
                r"
                INSERT INTO lectures (course_id, id, name, description)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(&course_id)
            .bind(lecture.id().to_string())
            .bind(lecture.name())
            .bind(lecture.description())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        for quiz in course.quizzes() {
            let quiz_id = quiz.id().to_string();
            sqlx::query(
                r"
                INSERT INTO quizzes (course_id, id, title, description)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(&course_id)
            .bind(&quiz_id)
            .bind(quiz.title())
            .bind(quiz.description())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

            for question in quiz.questions() {
                sqlx::query(
                    r"
                    INSERT INTO questions
                        (course_id, quiz_id, id, question, options, correct_answer, points)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                )
                .bind(&course_id)
                .bind(&quiz_id)
                .bind(question.id().to_string())
                .bind(question.text())
                .bind(string_vec_to_json(question.options())?)
                .bind(question.correct_answer())
                .bind(i64::from(question.points()))
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
        }

        insert_sequence(&mut tx, &course_id, course.sequence()).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Course, StorageError> {
        let course_id = id.to_string();

        let course_row = sqlx::query("SELECT title FROM courses WHERE id = ?1")
            .bind(&course_id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .ok_or(StorageError::NotFound)?;
        let title: String = course_row.try_get("title").map_err(ser)?;

        let lecture_rows =
            sqlx::query("SELECT id, name, description FROM lectures WHERE course_id = ?1")
                .bind(&course_id)
                .fetch_all(self.pool())
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut lectures = Vec::with_capacity(lecture_rows.len());
        for row in lecture_rows {
            let lecture_id = LectureId::new(uuid_from_text(
                "lecture_id",
                &row.try_get::<String, _>("id").map_err(ser)?,
            )?);
            lectures.push(Lecture::from_persisted(
                lecture_id,
                row.try_get("name").map_err(ser)?,
                row.try_get("description").map_err(ser)?,
            ));
        }

        let question_rows = sqlx::query(
            r"
            SELECT quiz_id, id, question, options, correct_answer, points
            FROM questions
            WHERE course_id = ?1
            ",
        )
        .bind(&course_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions_by_quiz: HashMap<QuizId, Vec<Question>> = HashMap::new();
        for row in question_rows {
            let quiz_id = QuizId::new(uuid_from_text(
                "quiz_id",
                &row.try_get::<String, _>("quiz_id").map_err(ser)?,
            )?);
            let question = Question::from_persisted(
                map_question_id(&row)?,
                row.try_get("question").map_err(ser)?,
                string_vec_from_json(
                    "options",
                    &row.try_get::<String, _>("options").map_err(ser)?,
                )?,
                row.try_get("correct_answer").map_err(ser)?,
                points_from_i64(row.try_get::<i64, _>("points").map_err(ser)?)?,
            );
            questions_by_quiz.entry(quiz_id).or_default().push(question);
        }

        let quiz_rows =
            sqlx::query("SELECT id, title, description FROM quizzes WHERE course_id = ?1")
                .bind(&course_id)
                .fetch_all(self.pool())
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut quizzes = Vec::with_capacity(quiz_rows.len());
        for row in quiz_rows {
            let quiz_id = QuizId::new(uuid_from_text(
                "quiz_id",
                &row.try_get::<String, _>("id").map_err(ser)?,
            )?);
            quizzes.push(Quiz::from_persisted(
                quiz_id,
                row.try_get("title").map_err(ser)?,
                row.try_get("description").map_err(ser)?,
                questions_by_quiz.remove(&quiz_id).unwrap_or_default(),
            ));
        }

        let sequence_rows = sqlx::query(
            r"
            SELECT kind, content_id
            FROM course_sequence
            WHERE course_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(&course_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut sequence = Vec::with_capacity(sequence_rows.len());
        for row in sequence_rows {
            sequence.push(sequence_item_from_parts(
                &row.try_get::<String, _>("kind").map_err(ser)?,
                &row.try_get::<String, _>("content_id").map_err(ser)?,
            )?);
        }

        Ok(Course::from_persisted(id, title, lectures, quizzes, sequence))
    }

    async fn set_sequence(
        &self,
        course_id: CourseId,
        items: &[SequenceItem],
    ) -> Result<(), StorageError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let course_id = course_id.to_string();

        let exists = sqlx::query("SELECT 1 FROM courses WHERE id = ?1")
            .bind(&course_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        sqlx::query("DELETE FROM course_sequence WHERE course_id = ?1")
            .bind(&course_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        insert_sequence(&mut tx, &course_id, items).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }
}

async fn insert_sequence(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    course_id: &str,
    items: &[SequenceItem],
) -> Result<(), StorageError> {
    for (position, item) in items.iter().enumerate() {
        let position = i64::try_from(position)
            .map_err(|_| StorageError::Serialization("sequence position overflow".into()))?;
        sqlx::query(
            r"
            INSERT INTO course_sequence (course_id, position, kind, content_id)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(course_id)
        .bind(position)
        .bind(kind_to_str(item.kind()))
        .bind(item.content_id())
        .execute(&mut **tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    }
    Ok(())
}
