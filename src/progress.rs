use crate::attempts::AttemptRecorder;
use crate::content::ContentStore;
use crate::errors::AppResult;
use crate::models::{QuizAttempt, User, UserProgress};

const STRENGTH_THRESHOLD: u32 = 80;
const WEAKNESS_THRESHOLD: u32 = 60;

/// Derives [`UserProgress`] from the stored quizzes and attempts on every read.
#[derive(Clone)]
pub struct ProgressAggregator {
    content: ContentStore,
    attempts: AttemptRecorder,
}

impl ProgressAggregator {
    pub fn new(content: ContentStore, attempts: AttemptRecorder) -> Self {
        Self { content, attempts }
    }

    pub async fn user_progress(&self, user: &User) -> AppResult<UserProgress> {
        let total_quizzes = self.content.user_quizzes(user).await?.len();
        let attempts = self.attempts.user_attempts(user).await?;
        Ok(summarize(total_quizzes, &attempts))
    }
}

/// The strength/weakness labels are a coarse banding of the average score,
/// not a per-topic skills model.
pub fn summarize(total_quizzes: usize, attempts: &[QuizAttempt]) -> UserProgress {
    if attempts.is_empty() {
        return UserProgress {
            total_quizzes,
            completed_quizzes: 0,
            average_score: 0,
            total_time_spent: 0,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
        };
    }

    let total_score: u64 = attempts.iter().map(|a| a.score as u64).sum();
    let average_score = (total_score as f64 / attempts.len() as f64).round() as u32;

    let strengths = if average_score >= STRENGTH_THRESHOLD {
        vec!["Critical Thinking".to_string(), "Problem Solving".to_string()]
    } else {
        Vec::new()
    };
    let weaknesses = if average_score < WEAKNESS_THRESHOLD {
        vec!["Concept Understanding".to_string(), "Application".to_string()]
    } else {
        Vec::new()
    };

    UserProgress {
        total_quizzes,
        completed_quizzes: attempts.len(),
        average_score,
        total_time_spent: attempts.iter().map(|a| a.time_spent).sum(),
        strengths,
        weaknesses,
    }
}
