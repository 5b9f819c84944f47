use std::sync::Arc;

use lms_core::model::{
    Course, CourseId, Lecture, LectureId, Question, QuestionId, Quiz, QuizId,
    DEFAULT_QUESTION_POINTS,
};
use storage::repository::{CatalogRepository, StorageError};

use crate::error::{CatalogServiceError, NotFound};

/// Administers course content: lectures, quizzes, and their questions.
///
/// Each mutation loads the aggregate, rebuilds it, and persists the whole
/// course; removals deliberately leave sequence references dangling for the
/// resolver's placeholder path.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Create and persist an empty course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Course` for an invalid title.
    pub async fn create_course(
        &self,
        title: impl Into<String>,
    ) -> Result<Course, CatalogServiceError> {
        let course = Course::new(CourseId::generate(), title)?;
        self.catalog.upsert_course(&course).await?;
        Ok(course)
    }

    /// Fetch a course aggregate.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Course` if unknown.
    pub async fn get_course(&self, course_id: CourseId) -> Result<Course, CatalogServiceError> {
        self.load_course(course_id).await
    }

    /// Add a lecture to a course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Course` or validation errors.
    pub async fn add_lecture(
        &self,
        course_id: CourseId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<LectureId, CatalogServiceError> {
        let mut course = self.load_course(course_id).await?;
        let lecture = Lecture::new(LectureId::generate(), name, description)?;
        let lecture_id = lecture.id();
        course.add_lecture(lecture);
        self.catalog.upsert_course(&course).await?;
        Ok(lecture_id)
    }

    /// Remove a lecture from a course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Lecture` if the course has no such lecture.
    pub async fn remove_lecture(
        &self,
        course_id: CourseId,
        lecture_id: LectureId,
    ) -> Result<(), CatalogServiceError> {
        let mut course = self.load_course(course_id).await?;
        if !course.remove_lecture(lecture_id) {
            return Err(NotFound::Lecture(lecture_id).into());
        }
        self.catalog.upsert_course(&course).await?;
        Ok(())
    }

    /// Add an empty quiz to a course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Course` or validation errors.
    pub async fn add_quiz(
        &self,
        course_id: CourseId,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Result<QuizId, CatalogServiceError> {
        let mut course = self.load_course(course_id).await?;
        let quiz = Quiz::new(QuizId::generate(), title, description, Vec::new())?;
        let quiz_id = quiz.id();
        course.add_quiz(quiz);
        self.catalog.upsert_course(&course).await?;
        Ok(quiz_id)
    }

    /// Remove a quiz (and its questions) from a course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Quiz` if the course has no such quiz.
    pub async fn remove_quiz(
        &self,
        course_id: CourseId,
        quiz_id: QuizId,
    ) -> Result<(), CatalogServiceError> {
        let mut course = self.load_course(course_id).await?;
        if !course.remove_quiz(quiz_id) {
            return Err(NotFound::Quiz(quiz_id).into());
        }
        self.catalog.upsert_course(&course).await?;
        Ok(())
    }

    /// Add a question to a quiz. `points` defaults to 1 when omitted.
    ///
    /// The quiz's total points follow from its question set, so no separate
    /// bookkeeping happens here.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown course/quiz and
    /// `CatalogServiceError::Quiz` for invalid question data.
    pub async fn add_question(
        &self,
        course_id: CourseId,
        quiz_id: QuizId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        points: Option<u32>,
    ) -> Result<QuestionId, CatalogServiceError> {
        let question = Question::new(
            QuestionId::generate(),
            text,
            options,
            correct_answer,
            points.unwrap_or(DEFAULT_QUESTION_POINTS),
        )?;
        let question_id = question.id();

        let mut course = self.load_course(course_id).await?;
        let quiz = course
            .quiz_mut(quiz_id)
            .ok_or(NotFound::Quiz(quiz_id))?;
        quiz.add_question(question);
        self.catalog.upsert_course(&course).await?;
        Ok(question_id)
    }

    /// Replace a question's content in place, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Question` if the quiz has no such question, or
    /// validation errors for the new data.
    pub async fn update_question(
        &self,
        course_id: CourseId,
        quiz_id: QuizId,
        question_id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        points: u32,
    ) -> Result<(), CatalogServiceError> {
        let replacement = Question::new(question_id, text, options, correct_answer, points)?;

        let mut course = self.load_course(course_id).await?;
        let quiz = course
            .quiz_mut(quiz_id)
            .ok_or(NotFound::Quiz(quiz_id))?;
        if quiz.question(question_id).is_none() {
            return Err(NotFound::Question(question_id).into());
        }
        quiz.upsert_question(replacement);
        self.catalog.upsert_course(&course).await?;
        Ok(())
    }

    /// Remove a question from a quiz.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Question` if the quiz has no such question.
    pub async fn remove_question(
        &self,
        course_id: CourseId,
        quiz_id: QuizId,
        question_id: QuestionId,
    ) -> Result<(), CatalogServiceError> {
        let mut course = self.load_course(course_id).await?;
        let quiz = course
            .quiz_mut(quiz_id)
            .ok_or(NotFound::Quiz(quiz_id))?;
        if !quiz.remove_question(question_id) {
            return Err(NotFound::Question(question_id).into());
        }
        self.catalog.upsert_course(&course).await?;
        Ok(())
    }

    async fn load_course(&self, course_id: CourseId) -> Result<Course, CatalogServiceError> {
        match self.catalog.get_course(course_id).await {
            Ok(course) => Ok(course),
            Err(StorageError::NotFound) => Err(NotFound::Course(course_id).into()),
            Err(err) => Err(err.into()),
        }
    }
}
