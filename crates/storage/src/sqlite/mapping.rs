use lms_core::model::{
    Badge, BadgeId, LectureId, LectureProgress, QuestionId, QuizId, QuizScoreEntry, SequenceItem,
    SequenceKind, UserId,
};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn uuid_from_text(field: &'static str, raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|_| StorageError::Serialization(format!("invalid {field}: {raw}")))
}

pub(crate) fn points_from_i64(v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid points: {v}")))
}

pub(crate) fn kind_to_str(kind: SequenceKind) -> &'static str {
    kind.as_str()
}

pub(crate) fn sequence_item_from_parts(
    kind: &str,
    content_id: &str,
) -> Result<SequenceItem, StorageError> {
    let id = uuid_from_text("content_id", content_id)?;
    match kind {
        "video" => Ok(SequenceItem::Video {
            content_id: LectureId::new(id),
        }),
        "quiz" => Ok(SequenceItem::Quiz {
            content_id: QuizId::new(id),
        }),
        other => Err(StorageError::Serialization(format!(
            "invalid sequence kind: {other}"
        ))),
    }
}

/// Notes and question options are stored as JSON string arrays, mirroring the
/// embedded-array shape of the source documents.
pub(crate) fn string_vec_from_json(field: &'static str, raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field} json: {e}")))
}

pub(crate) fn string_vec_to_json(values: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(values).map_err(ser)
}

pub(crate) fn map_badge_row(row: &sqlx::sqlite::SqliteRow) -> Result<Badge, StorageError> {
    let id = BadgeId::new(uuid_from_text(
        "badge_id",
        &row.try_get::<String, _>("id").map_err(ser)?,
    )?);
    let asset = row
        .try_get::<Option<String>, _>("asset_url")
        .map_err(ser)?
        .map(|raw| url::Url::parse(&raw).map_err(ser))
        .transpose()?;

    Ok(Badge::from_persisted(
        id,
        row.try_get("title").map_err(ser)?,
        row.try_get("content").map_err(ser)?,
        row.try_get("xp_threshold").map_err(ser)?,
        asset,
        row.try_get("created_at").map_err(ser)?,
    ))
}

pub(crate) fn map_score_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuizScoreEntry, StorageError> {
    let quiz_id = QuizId::new(uuid_from_text(
        "quiz_id",
        &row.try_get::<String, _>("quiz_id").map_err(ser)?,
    )?);
    let score = points_from_i64(row.try_get::<i64, _>("score").map_err(ser)?)?;
    let total_points = points_from_i64(row.try_get::<i64, _>("total_points").map_err(ser)?)?;

    QuizScoreEntry::new(
        quiz_id,
        score,
        total_points,
        row.try_get("submitted_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_lecture_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LectureProgress, StorageError> {
    let lecture_id = LectureId::new(uuid_from_text(
        "lecture_id",
        &row.try_get::<String, _>("lecture_id").map_err(ser)?,
    )?);
    let marked: i64 = row.try_get("marked").map_err(ser)?;
    let notes = string_vec_from_json("notes", &row.try_get::<String, _>("notes").map_err(ser)?)?;

    Ok(LectureProgress::from_persisted(
        lecture_id,
        marked != 0,
        notes,
    ))
}

pub(crate) fn map_question_id(row: &sqlx::sqlite::SqliteRow) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(uuid_from_text(
        "question_id",
        &row.try_get::<String, _>("id").map_err(ser)?,
    )?))
}

pub(crate) fn user_id_from_text(raw: &str) -> Result<UserId, StorageError> {
    Ok(UserId::new(uuid_from_text("user_id", raw)?))
}
