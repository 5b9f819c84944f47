use std::sync::Arc;

use serde::Serialize;

use lms_core::model::{
    Course, CourseError, CourseId, Lecture, Quiz, SequenceItem, SequenceKind,
};
use storage::repository::{CatalogRepository, StorageError};

use crate::error::{NotFound, SequenceServiceError, ValidationError};

/// Display name substituted for a sequence slot whose target was deleted.
pub const CONTENT_NOT_FOUND: &str = "Content Not Found";

/// One slot of a resolved course sequence, details substituted from the
/// catalog. Placeholder slots keep the original kind and id but carry the
/// `CONTENT_NOT_FOUND` name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSequenceItem {
    #[serde(rename = "type")]
    pub kind: SequenceKind,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_points: Option<u32>,
}

impl ResolvedSequenceItem {
    fn lecture(lecture: &Lecture) -> Self {
        Self {
            kind: SequenceKind::Video,
            id: lecture.id().to_string(),
            name: lecture.name().to_owned(),
            description: lecture.description().map(str::to_owned),
            total_points: None,
        }
    }

    fn quiz(quiz: &Quiz) -> Self {
        Self {
            kind: SequenceKind::Quiz,
            id: quiz.id().to_string(),
            name: quiz.title().to_owned(),
            description: quiz.description().map(str::to_owned),
            total_points: Some(quiz.total_points()),
        }
    }

    fn missing(item: &SequenceItem) -> Self {
        Self {
            kind: item.kind(),
            id: item.content_id(),
            name: CONTENT_NOT_FOUND.to_owned(),
            description: Some("This item might have been removed.".to_owned()),
            total_points: None,
        }
    }

    /// Whether this slot is the placeholder for deleted content.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.name == CONTENT_NOT_FOUND
    }
}

/// Expands stored course sequences into display-ready items and replaces
/// them after validation.
#[derive(Clone)]
pub struct SequenceService {
    catalog: Arc<dyn CatalogRepository>,
}

impl SequenceService {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Resolve a course's sequence in stored order.
    ///
    /// A slot whose target no longer exists resolves to a placeholder
    /// rather than failing the whole request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Course` if the course is unknown.
    pub async fn get_sequence(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<ResolvedSequenceItem>, SequenceServiceError> {
        let course = self.load_course(course_id).await?;

        Ok(course
            .sequence()
            .iter()
            .map(|item| match item {
                SequenceItem::Video { content_id } => course
                    .lecture(*content_id)
                    .map_or_else(|| ResolvedSequenceItem::missing(item), ResolvedSequenceItem::lecture),
                SequenceItem::Quiz { content_id } => course
                    .quiz(*content_id)
                    .map_or_else(|| ResolvedSequenceItem::missing(item), ResolvedSequenceItem::quiz),
            })
            .collect())
    }

    /// Validate and atomically replace a course's sequence.
    ///
    /// Every item must reference a lecture or quiz belonging to the course;
    /// on any violation nothing is replaced.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Course` for an unknown course and
    /// `ValidationError::SequenceTargetMissing` for a dangling item.
    pub async fn set_sequence(
        &self,
        course_id: CourseId,
        items: Vec<SequenceItem>,
    ) -> Result<(), SequenceServiceError> {
        let course = self.load_course(course_id).await?;

        course.validate_sequence(&items).map_err(|err| match err {
            CourseError::SequenceTargetMissing { kind, content_id } => {
                SequenceServiceError::Validation(ValidationError::SequenceTargetMissing {
                    kind,
                    content_id,
                })
            }
            other => StorageError::Serialization(other.to_string()).into(),
        })?;

        self.catalog.set_sequence(course_id, &items).await?;
        Ok(())
    }

    async fn load_course(&self, course_id: CourseId) -> Result<Course, SequenceServiceError> {
        match self.catalog.get_course(course_id).await {
            Ok(course) => Ok(course),
            Err(StorageError::NotFound) => Err(NotFound::Course(course_id).into()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{LectureId, Question, QuestionId, QuizId};
    use storage::repository::InMemoryRepository;

    async fn setup() -> (SequenceService, InMemoryRepository, CourseId, LectureId, QuizId) {
        let repo = InMemoryRepository::new();
        let mut course = Course::new(CourseId::generate(), "Intro to Web Development").unwrap();

        let lecture = Lecture::new(LectureId::generate(), "HTML basics", Some("tags".into())).unwrap();
        let lecture_id = lecture.id();
        course.add_lecture(lecture);

        let quiz = Quiz::new(
            QuizId::generate(),
            "Checkpoint",
            None,
            vec![Question::new(
                QuestionId::generate(),
                "Which tag defines a hyperlink?",
                vec!["<a>".to_owned(), "<link>".to_owned()],
                "<a>",
                5,
            )
            .unwrap()],
        )
        .unwrap();
        let quiz_id = quiz.id();
        course.add_quiz(quiz);
        repo.upsert_course(&course).await.unwrap();

        let service = SequenceService::new(Arc::new(repo.clone()));
        (service, repo, course.id(), lecture_id, quiz_id)
    }

    #[tokio::test]
    async fn round_trip_preserves_order_and_details() {
        let (service, _repo, course_id, lecture_id, quiz_id) = setup().await;

        service
            .set_sequence(
                course_id,
                vec![
                    SequenceItem::Video {
                        content_id: lecture_id,
                    },
                    SequenceItem::Quiz {
                        content_id: quiz_id,
                    },
                ],
            )
            .await
            .unwrap();

        let resolved = service.get_sequence(course_id).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].kind, SequenceKind::Video);
        assert_eq!(resolved[0].name, "HTML basics");
        assert_eq!(resolved[1].kind, SequenceKind::Quiz);
        assert_eq!(resolved[1].name, "Checkpoint");
        assert_eq!(resolved[1].total_points, Some(5));
    }

    #[tokio::test]
    async fn dangling_reference_resolves_to_placeholder() {
        let (service, repo, course_id, lecture_id, quiz_id) = setup().await;

        service
            .set_sequence(
                course_id,
                vec![
                    SequenceItem::Video {
                        content_id: lecture_id,
                    },
                    SequenceItem::Quiz {
                        content_id: quiz_id,
                    },
                ],
            )
            .await
            .unwrap();

        // Delete the quiz after the sequence referenced it.
        let mut course = repo.get_course(course_id).await.unwrap();
        assert!(course.remove_quiz(quiz_id));
        repo.upsert_course(&course).await.unwrap();

        let resolved = service.get_sequence(course_id).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(!resolved[0].is_placeholder());
        assert!(resolved[1].is_placeholder());
        assert_eq!(resolved[1].name, CONTENT_NOT_FOUND);
        assert_eq!(resolved[1].kind, SequenceKind::Quiz);
        assert_eq!(resolved[1].id, quiz_id.to_string());
    }

    #[tokio::test]
    async fn set_sequence_rejects_items_outside_the_course() {
        let (service, repo, course_id, lecture_id, _quiz_id) = setup().await;

        service
            .set_sequence(
                course_id,
                vec![SequenceItem::Video {
                    content_id: lecture_id,
                }],
            )
            .await
            .unwrap();

        let err = service
            .set_sequence(
                course_id,
                vec![SequenceItem::Quiz {
                    content_id: QuizId::generate(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SequenceServiceError::Validation(ValidationError::SequenceTargetMissing { .. })
        ));

        // All-or-nothing: the previous sequence is untouched.
        let course = repo.get_course(course_id).await.unwrap();
        assert_eq!(course.sequence().len(), 1);
    }

    #[tokio::test]
    async fn unknown_course_is_not_found() {
        let (service, _repo, _course_id, _lecture_id, _quiz_id) = setup().await;
        let err = service.get_sequence(CourseId::generate()).await.unwrap_err();
        assert!(matches!(
            err,
            SequenceServiceError::NotFound(NotFound::Course(_))
        ));
    }
}
