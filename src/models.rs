use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_premium: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub extracted_text: String,
    pub status: FileStatus,
}

/// An upload as received from the client, before it is processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

/// A submitted or expected answer. Comparison is strict: an option index
/// never equals a string, even when the string spells the same number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Answer {
    Index(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub correct_answer: Answer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub source_file: Uuid,
    pub total_questions: usize,
}

impl Quiz {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_id: Uuid,
    pub answers: HashMap<String, Answer>,
    pub score: u32,
    pub total_questions: usize,
    pub completed_at: DateTime<Utc>,
    /// Seconds between session start and submission.
    pub time_spent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProgress {
    pub total_quizzes: usize,
    pub completed_quizzes: usize,
    pub average_score: u32,
    pub total_time_spent: u64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

// Request bodies

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateQuizRequest {
    pub file_id: Uuid,
    pub question_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptRequest {
    pub answers: HashMap<String, Answer>,
    #[serde(default)]
    pub time_spent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartQuizSessionRequest {
    pub quiz_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnswerRequest {
    pub question_id: String,
    pub value: String,
}
