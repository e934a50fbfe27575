use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::attempts::AttemptRecorder;
use crate::errors::{AppError, AppResult};
use crate::models::{Answer, Question, QuestionType, Quiz, User};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    InProgress {
        question_index: usize,
        answers: HashMap<String, Answer>,
    },
    Submitted {
        score: u32,
        answers: HashMap<String, Answer>,
        time_spent: u64,
    },
}

/// Drives one pass through a quiz: navigation, answer collection,
/// submission and retake.
#[derive(Debug, Clone, Serialize)]
pub struct QuizSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub quiz: Quiz,
    pub started_at: DateTime<Utc>,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionReview {
    pub question_id: String,
    pub question: String,
    pub submitted: Option<Answer>,
    pub correct_answer: Answer,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizResults {
    pub score: u32,
    pub correct: usize,
    pub total: usize,
    pub time_spent: u64,
    pub badge: &'static str,
    pub review: Vec<QuestionReview>,
}

pub fn score_badge(score: u32) -> &'static str {
    if score >= 80 {
        "Excellent!"
    } else if score >= 60 {
        "Good Job!"
    } else {
        "Keep Practicing!"
    }
}

impl QuizSession {
    pub fn new(user: &User, quiz: Quiz) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            quiz,
            started_at: Utc::now(),
            state: Self::initial_state(),
        }
    }

    fn initial_state() -> SessionState {
        SessionState::InProgress {
            question_index: 0,
            answers: HashMap::new(),
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self.state, SessionState::Submitted { .. })
    }

    pub fn current_question(&self) -> Option<&Question> {
        match &self.state {
            SessionState::InProgress { question_index, .. } => self.quiz.questions.get(*question_index),
            SessionState::Submitted { .. } => None,
        }
    }

    fn last_index(&self) -> usize {
        self.quiz.questions.len().saturating_sub(1)
    }

    /// Records an answer for `question_id`, replacing any earlier one.
    /// Multiple-choice values are parsed as option indices; other types keep
    /// the raw string. Option ranges are not checked.
    pub fn answer(&mut self, question_id: &str, value: &str) -> AppResult<()> {
        let question_type = self
            .quiz
            .question(question_id)
            .map(|q| q.question_type)
            .ok_or_else(|| {
                AppError::ValidationError(format!("Question '{}' is not part of this quiz", question_id))
            })?;

        let SessionState::InProgress { answers, .. } = &mut self.state else {
            return Err(AppError::ValidationError(
                "Quiz has already been submitted".to_string(),
            ));
        };

        let answer = match question_type {
            QuestionType::MultipleChoice => {
                let index = value.trim().parse::<i64>().map_err(|_| {
                    AppError::ValidationError(format!("'{}' is not an option index", value))
                })?;
                Answer::Index(index)
            }
            QuestionType::TrueFalse | QuestionType::ShortAnswer => Answer::Text(value.to_string()),
        };

        answers.insert(question_id.to_string(), answer);
        Ok(())
    }

    pub fn next(&mut self) {
        let last = self.last_index();
        if let SessionState::InProgress { question_index, .. } = &mut self.state {
            if *question_index < last {
                *question_index += 1;
            }
        }
    }

    pub fn previous(&mut self) {
        if let SessionState::InProgress { question_index, .. } = &mut self.state {
            if *question_index > 0 {
                *question_index -= 1;
            }
        }
    }

    /// Whether the current question has an answer recorded.
    pub fn can_advance(&self) -> bool {
        match (&self.state, self.current_question()) {
            (SessionState::InProgress { answers, .. }, Some(question)) => answers.contains_key(&question.id),
            _ => false,
        }
    }

    pub fn can_submit(&self) -> bool {
        match &self.state {
            SessionState::InProgress { question_index, .. } => {
                *question_index == self.last_index() && self.can_advance()
            }
            SessionState::Submitted { .. } => false,
        }
    }

    /// Records the attempt and moves to `Submitted`.
    pub async fn submit(&mut self, recorder: &AttemptRecorder, user: &User) -> AppResult<u32> {
        if !self.can_submit() {
            return Err(AppError::ValidationError(
                "Answer the last question before submitting".to_string(),
            ));
        }
        let SessionState::InProgress { answers, .. } = &self.state else {
            return Err(AppError::InternalError("session state changed".to_string()));
        };
        let answers = answers.clone();

        let time_spent = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
        let score = recorder
            .submit_quiz_attempt(user, self.quiz.id, answers.clone(), time_spent)
            .await?;

        self.state = SessionState::Submitted {
            score,
            answers,
            time_spent,
        };
        Ok(score)
    }

    /// Starts over from the first question. The earlier attempt stays recorded.
    pub fn retake(&mut self) -> AppResult<()> {
        if !self.is_submitted() {
            return Err(AppError::ValidationError(
                "Only a submitted quiz can be retaken".to_string(),
            ));
        }
        self.state = Self::initial_state();
        self.started_at = Utc::now();
        Ok(())
    }

    pub fn results(&self) -> Option<QuizResults> {
        let SessionState::Submitted {
            score,
            answers,
            time_spent,
        } = &self.state
        else {
            return None;
        };

        let total = self.quiz.questions.len();
        let review = self
            .quiz
            .questions
            .iter()
            .map(|q| {
                let submitted = answers.get(&q.id).cloned();
                QuestionReview {
                    question_id: q.id.clone(),
                    question: q.question.clone(),
                    is_correct: submitted.as_ref() == Some(&q.correct_answer),
                    submitted,
                    correct_answer: q.correct_answer.clone(),
                    explanation: q.explanation.clone(),
                }
            })
            .collect();

        Some(QuizResults {
            score: *score,
            correct: (*score as f64 / 100.0 * total as f64).round() as usize,
            total,
            time_spent: *time_spent,
            badge: score_badge(*score),
            review,
        })
    }
}

/// Submitted sessions stay viewable (results, retake) for this long after
/// their last use.
const SUBMITTED_IDLE_MINUTES: i64 = 30;
/// Unfinished sessions are dropped after this long without use.
const ABANDONED_IDLE_HOURS: i64 = 24;

struct RegistryEntry {
    user_id: Uuid,
    last_active: DateTime<Utc>,
    session: Arc<Mutex<QuizSession>>,
}

/// Live quiz sessions by id. Each session has its own lock, so a submit
/// waiting on storage only blocks callers of that one session.
#[derive(Clone, Default)]
pub struct QuizSessionRegistry {
    entries: Arc<Mutex<HashMap<Uuid, RegistryEntry>>>,
}

impl QuizSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: QuizSession) -> Uuid {
        let id = session.id;
        let entry = RegistryEntry {
            user_id: session.user_id,
            last_active: Utc::now(),
            session: Arc::new(Mutex::new(session)),
        };
        self.entries.lock().await.insert(id, entry);
        id
    }

    /// Returns the session if it belongs to `user_id`, marking it as used.
    pub async fn get(&self, id: Uuid, user_id: Uuid) -> Option<Arc<Mutex<QuizSession>>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&id).filter(|e| e.user_id == user_id)?;
        entry.last_active = Utc::now();
        Some(entry.session.clone())
    }

    pub async fn remove_user(&self, user_id: Uuid) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.user_id != user_id);
        before - entries.len()
    }

    /// Drops submitted and abandoned sessions idle past their limit. Sessions
    /// busy at the time are kept.
    pub async fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            let idle = now - entry.last_active;
            match entry.session.try_lock() {
                Ok(session) if session.is_submitted() => idle < Duration::minutes(SUBMITTED_IDLE_MINUTES),
                Ok(_) => idle < Duration::hours(ABANDONED_IDLE_HOURS),
                Err(_) => true,
            }
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
