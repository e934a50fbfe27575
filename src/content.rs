use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{FileStatus, FileUpload, Quiz, UploadedFile, User};
use crate::providers::{QuizGenerator, TextExtractor};
use crate::storage::{JsonStore, FILES_KEY, QUIZZES_KEY};
use crate::subscriptions::{check_monthly_limit, FREE_QUIZZES_PER_MONTH, FREE_UPLOADS_PER_MONTH};
use crate::{log_service_error, log_service_start, log_service_success, log_validation};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_QUESTION_COUNT: usize = 5;

/// Caller-side check run before [`ContentStore::upload_file`].
pub fn validate_upload(file: &FileUpload) -> AppResult<()> {
    if file.content_type != PDF_CONTENT_TYPE {
        let error = AppError::ValidationError("Please upload a PDF file".to_string());
        log_validation!(failure, "upload", error = error);
        return Err(error);
    }
    if file.size > MAX_UPLOAD_BYTES {
        let error = AppError::ValidationError("File size must be less than 10MB".to_string());
        log_validation!(failure, "upload", error = error);
        return Err(error);
    }
    log_validation!(success, "upload", "pdf accepted");
    Ok(())
}

#[derive(Clone)]
pub struct ContentStore {
    store: JsonStore,
    extractor: Arc<dyn TextExtractor>,
    generator: Arc<dyn QuizGenerator>,
}

impl ContentStore {
    pub fn new(
        store: JsonStore,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn QuizGenerator>,
    ) -> Self {
        Self {
            store,
            extractor,
            generator,
        }
    }

    pub async fn upload_file(&self, user: &User, file: FileUpload) -> AppResult<UploadedFile> {
        log_service_start!("content_store", "upload_file", user_id = user.id);
        let start = Instant::now();

        let files = self.user_files(user).await?;
        check_monthly_limit(user, files.iter().map(|f| f.uploaded_at), FREE_UPLOADS_PER_MONTH, "uploads")?;

        let extracted_text = self.extractor.extract_text(&file).await.map_err(|e| {
            log_service_error!("content_store", "upload_file", error = e);
            AppError::InternalError(format!("Failed to process '{}'", file.name))
        })?;

        let uploaded = UploadedFile {
            id: Uuid::now_v7(),
            user_id: user.id,
            name: file.name,
            size: file.size,
            uploaded_at: Utc::now(),
            extracted_text,
            status: FileStatus::Completed,
        };
        // Extraction can take a while; count again under the store lock.
        self.store
            .append_checked(FILES_KEY, uploaded.clone(), |files: &[UploadedFile]| {
                let owned = files.iter().filter(|f| f.user_id == user.id);
                check_monthly_limit(user, owned.map(|f| f.uploaded_at), FREE_UPLOADS_PER_MONTH, "uploads")
            })
            .await?;

        log_service_success!(
            "content_store",
            "upload_file",
            count = 1,
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(uploaded)
    }

    pub async fn generate_quiz(
        &self,
        user: &User,
        file_id: Uuid,
        question_count: usize,
    ) -> AppResult<Quiz> {
        log_service_start!("content_store", "generate_quiz", user_id = user.id);
        let start = Instant::now();

        if question_count == 0 {
            return Err(AppError::ValidationError(
                "Question count must be at least 1".to_string(),
            ));
        }

        let quizzes = self.user_quizzes(user).await?;
        check_monthly_limit(user, quizzes.iter().map(|q| q.created_at), FREE_QUIZZES_PER_MONTH, "quizzes")?;

        let source = self
            .user_files(user)
            .await?
            .into_iter()
            .find(|f| f.id == file_id)
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))?;

        let questions = self
            .generator
            .generate_questions(&source.extracted_text, question_count)
            .await
            .map_err(|e| {
                log_service_error!("content_store", "generate_quiz", error = e);
                AppError::InternalError("Quiz generation failed".to_string())
            })?;
        if questions.is_empty() {
            return Err(AppError::InternalError(
                "Quiz generator returned no questions".to_string(),
            ));
        }

        let quiz = Quiz {
            id: Uuid::now_v7(),
            user_id: user.id,
            title: "Quiz from uploaded document".to_string(),
            total_questions: questions.len(),
            questions,
            created_at: Utc::now(),
            source_file: file_id,
        };
        self.store
            .append_checked(QUIZZES_KEY, quiz.clone(), |quizzes: &[Quiz]| {
                let owned = quizzes.iter().filter(|q| q.user_id == user.id);
                check_monthly_limit(user, owned.map(|q| q.created_at), FREE_QUIZZES_PER_MONTH, "quizzes")
            })
            .await?;

        log_service_success!(
            "content_store",
            "generate_quiz",
            count = quiz.total_questions,
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(quiz)
    }

    pub async fn user_quizzes(&self, user: &User) -> AppResult<Vec<Quiz>> {
        let quizzes: Vec<Quiz> = self.store.read_list(QUIZZES_KEY).await?;
        Ok(quizzes.into_iter().filter(|q| q.user_id == user.id).collect())
    }

    pub async fn user_files(&self, user: &User) -> AppResult<Vec<UploadedFile>> {
        let files: Vec<UploadedFile> = self.store.read_list(FILES_KEY).await?;
        Ok(files.into_iter().filter(|f| f.user_id == user.id).collect())
    }

    pub async fn find_quiz(&self, quiz_id: Uuid) -> AppResult<Option<Quiz>> {
        let quizzes: Vec<Quiz> = self.store.read_list(QUIZZES_KEY).await?;
        Ok(quizzes.into_iter().find(|q| q.id == quiz_id))
    }

    /// Looks up a quiz owned by `user`. Other users' quizzes are `NotFound`.
    pub async fn find_user_quiz(&self, user: &User, quiz_id: Uuid) -> AppResult<Quiz> {
        self.find_quiz(quiz_id)
            .await?
            .filter(|q| q.user_id == user.id)
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", quiz_id)))
    }
}
