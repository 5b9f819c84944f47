use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use lms_core::grader::{self, QuestionResult, SubmittedAnswer};
use lms_core::model::{CourseId, EngineSettings, QuizId, QuizScoreEntry, UserId};
use lms_core::Clock;
use storage::repository::{
    CatalogRepository, ProgressRepository, StorageError, UserRepository,
};

use crate::badge_service::{BadgeOutcome, BadgeService};
use crate::error::{NotFound, QuizServiceError, ValidationError};

/// Result of a quiz submission: the grade, the new XP total, and the badge
/// pass that followed it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizSubmissionResult {
    pub score: u32,
    pub total_points: u32,
    pub xp: i64,
    pub per_question: Vec<QuestionResult>,
    pub badges: BadgeOutcome,
}

/// Orchestrates quiz submissions: grading, history, XP delta, badges.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    settings: EngineSettings,
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
    users: Arc<dyn UserRepository>,
    badges: Arc<BadgeService>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: EngineSettings,
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressRepository>,
        users: Arc<dyn UserRepository>,
        badges: Arc<BadgeService>,
    ) -> Self {
        Self {
            clock,
            settings,
            catalog,
            progress,
            users,
            badges,
        }
    }

    /// Grade a submission, append it to the attempt history, and credit the
    /// net score change to the XP ledger.
    ///
    /// The ledger delta is `new_score - previous_score_for_this_quiz`, where
    /// the previous score is the most recent prior history entry for the
    /// same quiz (0 if none). Improvement credits XP, regression debits it,
    /// and repeating an identical score is a wash — a resubmission never
    /// double-counts.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown course or quiz and
    /// `ValidationError::DuplicateAnswer` for a submission answering the
    /// same question twice — both before anything is written. Returns
    /// `QuizServiceError::Definition` if the stored definition is
    /// internally invalid.
    pub async fn submit_quiz(
        &self,
        user_id: UserId,
        course_id: CourseId,
        quiz_id: QuizId,
        answers: &[SubmittedAnswer],
    ) -> Result<QuizSubmissionResult, QuizServiceError> {
        let mut seen = HashSet::new();
        for answer in answers {
            if !seen.insert(answer.question_id) {
                return Err(ValidationError::DuplicateAnswer(answer.question_id).into());
            }
        }

        let course = match self.catalog.get_course(course_id).await {
            Ok(course) => course,
            Err(StorageError::NotFound) => return Err(NotFound::Course(course_id).into()),
            Err(err) => return Err(err.into()),
        };
        let quiz = course
            .quiz(quiz_id)
            .ok_or(NotFound::Quiz(quiz_id))?;

        let outcome = grader::grade(quiz, answers)?;
        for question_id in &outcome.unmatched {
            warn!(
                %quiz_id,
                %question_id,
                "submitted answer references a question not in the quiz; ignoring"
            );
        }

        let entry = QuizScoreEntry::new(
            quiz_id,
            outcome.score,
            outcome.total_points,
            self.clock.now(),
        )?;
        let previous = self
            .progress
            .append_quiz_score(
                user_id,
                course_id,
                &entry,
                self.settings.quiz_history_limit(),
            )
            .await?;

        let delta = i64::from(outcome.score) - i64::from(previous.unwrap_or(0));
        let xp = if delta == 0 {
            self.users.xp(user_id).await?
        } else {
            self.users.apply_xp_delta(user_id, delta).await?
        };
        debug!(
            %user_id,
            %quiz_id,
            score = outcome.score,
            total_points = outcome.total_points,
            delta,
            xp,
            "quiz submission recorded"
        );

        let badges = self.badges.reconcile_outcome(user_id).await;

        Ok(QuizSubmissionResult {
            score: outcome.score,
            total_points: outcome.total_points,
            xp,
            per_question: outcome.per_question,
            badges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lms_core::model::{Course, Question, QuestionId, Quiz};
    use lms_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    struct Fixture {
        service: QuizService,
        course_id: CourseId,
        quiz_id: QuizId,
        q1: QuestionId,
        q2: QuestionId,
    }

    async fn setup(settings: EngineSettings) -> Fixture {
        let repo = InMemoryRepository::new();

        let q1 = Question::new(
            QuestionId::generate(),
            "Which tag defines a hyperlink?",
            vec!["<a>".to_owned(), "<link>".to_owned()],
            "<a>",
            5,
        )
        .unwrap();
        let q2 = Question::new(
            QuestionId::generate(),
            "Which language styles a page?",
            vec!["CSS".to_owned(), "SQL".to_owned()],
            "CSS",
            5,
        )
        .unwrap();
        let (id1, id2) = (q1.id(), q2.id());
        let quiz = Quiz::new(QuizId::generate(), "Checkpoint", None, vec![q1, q2]).unwrap();
        let quiz_id = quiz.id();

        let mut course = Course::new(CourseId::generate(), "Intro to Web Development").unwrap();
        course.add_quiz(quiz);
        repo.upsert_course(&course).await.unwrap();

        let badges = Arc::new(BadgeService::new(
            fixed_clock(),
            settings,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        ));
        let service = QuizService::new(
            fixed_clock(),
            settings,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            badges,
        );

        Fixture {
            service,
            course_id: course.id(),
            quiz_id,
            q1: id1,
            q2: id2,
        }
    }

    #[tokio::test]
    async fn resubmission_credits_only_the_net_improvement() {
        let fx = setup(EngineSettings::standard()).await;
        let user = UserId::generate();

        // Score 10/10 first.
        let first = fx
            .service
            .submit_quiz(
                user,
                fx.course_id,
                fx.quiz_id,
                &[
                    SubmittedAnswer::new(fx.q1, "<a>"),
                    SubmittedAnswer::new(fx.q2, "css"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(first.score, 10);
        assert_eq!(first.total_points, 10);
        assert_eq!(first.xp, 10);

        // Resubmit with one correct answer: delta = 5 - 10 = -5.
        let second = fx
            .service
            .submit_quiz(
                user,
                fx.course_id,
                fx.quiz_id,
                &[
                    SubmittedAnswer::new(fx.q1, "<link>"),
                    SubmittedAnswer::new(fx.q2, "CSS"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(second.score, 5);
        assert_eq!(second.xp, 5);
    }

    #[tokio::test]
    async fn improving_scores_credit_only_the_difference() {
        let fx = setup(EngineSettings::standard()).await;
        let user = UserId::generate();

        let first = fx
            .service
            .submit_quiz(
                user,
                fx.course_id,
                fx.quiz_id,
                &[SubmittedAnswer::new(fx.q2, "CSS")],
            )
            .await
            .unwrap();
        assert_eq!(first.score, 5);
        assert_eq!(first.xp, 5);

        let second = fx
            .service
            .submit_quiz(
                user,
                fx.course_id,
                fx.quiz_id,
                &[
                    SubmittedAnswer::new(fx.q1, "<a>"),
                    SubmittedAnswer::new(fx.q2, "CSS"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(second.score, 10);
        // Net XP across both calls equals the best score, not the sum.
        assert_eq!(second.xp, 10);
    }

    #[tokio::test]
    async fn duplicate_answers_are_rejected_before_grading() {
        let fx = setup(EngineSettings::standard()).await;
        let user = UserId::generate();

        let err = fx
            .service
            .submit_quiz(
                user,
                fx.course_id,
                fx.quiz_id,
                &[
                    SubmittedAnswer::new(fx.q1, "<a>"),
                    SubmittedAnswer::new(fx.q1, "<link>"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuizServiceError::Validation(ValidationError::DuplicateAnswer(id)) if id == fx.q1
        ));
    }

    #[tokio::test]
    async fn unknown_quiz_is_not_found() {
        let fx = setup(EngineSettings::standard()).await;
        let user = UserId::generate();

        let err = fx
            .service
            .submit_quiz(user, fx.course_id, QuizId::generate(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, QuizServiceError::NotFound(NotFound::Quiz(_))));
    }

    #[tokio::test]
    async fn history_cap_trims_oldest_attempts() {
        let settings = EngineSettings::new(Some(2), 3).unwrap();
        let fx = setup(settings).await;
        let user = UserId::generate();

        for _ in 0..3 {
            fx.service
                .submit_quiz(
                    user,
                    fx.course_id,
                    fx.quiz_id,
                    &[SubmittedAnswer::new(fx.q2, "CSS")],
                )
                .await
                .unwrap();
        }

        let progress = fx
            .service
            .progress
            .get_course_progress(user, fx.course_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.quiz_scores().len(), 2);
    }
}
