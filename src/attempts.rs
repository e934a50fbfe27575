use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use crate::content::ContentStore;
use crate::errors::{AppError, AppResult};
use crate::models::{Answer, Quiz, QuizAttempt, User};
use crate::storage::{JsonStore, ATTEMPTS_KEY};
use crate::{log_service_start, log_service_success, log_service_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub correct: usize,
    pub total: usize,
    pub score: u32,
}

/// `round(100 * correct / total)`, counting only strictly equal answers.
/// A quiz without questions scores 0.
pub fn score_answers(quiz: &Quiz, answers: &HashMap<String, Answer>) -> ScoreBreakdown {
    let total = quiz.questions.len();
    let correct = quiz
        .questions
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_answer))
        .count();

    let score = if total == 0 {
        0
    } else {
        (100.0 * correct as f64 / total as f64).round() as u32
    };

    ScoreBreakdown {
        correct,
        total,
        score,
    }
}

#[derive(Clone)]
pub struct AttemptRecorder {
    store: JsonStore,
    content: ContentStore,
}

impl AttemptRecorder {
    pub fn new(store: JsonStore, content: ContentStore) -> Self {
        Self { store, content }
    }

    /// Scores `answers` against the quiz and appends exactly one attempt.
    ///
    /// Fails with `NotFound` for an unknown quiz or one owned by another user,
    /// and with `ValidationError` when an answer key is not a question of the
    /// quiz; nothing is recorded in either case.
    pub async fn submit_quiz_attempt(
        &self,
        user: &User,
        quiz_id: Uuid,
        answers: HashMap<String, Answer>,
        time_spent: u64,
    ) -> AppResult<u32> {
        log_service_start!("attempt_recorder", "submit_quiz_attempt", quiz_id = quiz_id);

        let quiz = self.content.find_user_quiz(user, quiz_id).await.inspect_err(|_| {
            log_service_warn!("attempt_recorder", "submit_quiz_attempt", "quiz lookup failed");
        })?;

        if let Some(unknown) = answers.keys().find(|id| quiz.question(id).is_none()) {
            return Err(AppError::ValidationError(format!(
                "Question '{}' is not part of quiz {}",
                unknown, quiz_id
            )));
        }

        let breakdown = score_answers(&quiz, &answers);
        let attempt = QuizAttempt {
            id: Uuid::now_v7(),
            quiz_id,
            user_id: user.id,
            answers,
            score: breakdown.score,
            total_questions: breakdown.total,
            completed_at: Utc::now(),
            time_spent,
        };
        self.store.append(ATTEMPTS_KEY, attempt).await?;

        log_service_success!(
            "attempt_recorder",
            "submit_quiz_attempt",
            quiz_id = quiz_id,
            score = breakdown.score
        );
        Ok(breakdown.score)
    }

    pub async fn user_attempts(&self, user: &User) -> AppResult<Vec<QuizAttempt>> {
        let attempts: Vec<QuizAttempt> = self.store.read_list(ATTEMPTS_KEY).await?;
        Ok(attempts.into_iter().filter(|a| a.user_id == user.id).collect())
    }
}
