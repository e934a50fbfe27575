use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    attempts::AttemptRecorder,
    config::{Config, PaymentProviderType},
    content::{validate_upload, ContentStore, DEFAULT_QUESTION_COUNT},
    errors::{AppError, AppResult, ErrorContext},
    identity::{IdentityStore, Session},
    models::*,
    payments::{IntaSendProvider, MockPaymentProvider, PaymentProvider},
    progress::ProgressAggregator,
    providers::{MockQuizGenerator, MockTextExtractor, QuizGenerator, TextExtractor},
    quiz_session::{QuizResults, QuizSession, QuizSessionRegistry, SessionState},
    storage::{JsonStore, KeyValueStore},
    subscriptions::{
        format_currency, subscription_plans, supported_methods, CheckoutRequest, Country,
        PaymentRecord, SubscriptionPlan, SupportedMethod, SubscriptionService,
    },
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityStore,
    pub content: ContentStore,
    pub attempts: AttemptRecorder,
    pub progress: ProgressAggregator,
    pub subscriptions: SubscriptionService,
    pub quiz_sessions: QuizSessionRegistry,
}

impl AppState {
    /// Wires every service on top of one store, using the mocked document,
    /// generation and payment services configured by `config`.
    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        let payment_provider: Arc<dyn PaymentProvider> = match config.payments.provider {
            PaymentProviderType::Mock => {
                Arc::new(MockPaymentProvider::new(config.simulation.payment_delay()))
            }
            PaymentProviderType::IntaSend => Arc::new(IntaSendProvider::new(
                config.payments.public_key.clone(),
                config.payments.is_test,
                config.payments.base_url.clone(),
            )),
        };

        Self::with_services(
            store,
            Arc::new(MockTextExtractor::new(config.simulation.upload_delay())),
            Arc::new(MockQuizGenerator::new(config.simulation.generation_delay())),
            payment_provider,
            config.server.public_base_url.clone(),
        )
    }

    pub fn with_services(
        store: Arc<dyn KeyValueStore>,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn QuizGenerator>,
        payment_provider: Arc<dyn PaymentProvider>,
        public_base_url: String,
    ) -> Self {
        let json = JsonStore::new(store);
        let identity = IdentityStore::new(json.clone());
        let content = ContentStore::new(json.clone(), extractor, generator);
        let attempts = AttemptRecorder::new(json.clone(), content.clone());
        let progress = ProgressAggregator::new(content.clone(), attempts.clone());
        let subscriptions =
            SubscriptionService::new(json, identity.clone(), payment_provider, public_base_url);

        Self {
            identity,
            content,
            attempts,
            progress,
            subscriptions,
            quiz_sessions: QuizSessionRegistry::new(),
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

/// Maps a service result onto the JSON envelope, logging failures with context.
fn respond<T>(result: AppResult<T>, context: ErrorContext) -> ApiResult<T> {
    result
        .map(|data| Json(ApiResponse::success(data)))
        .map_err(|e| e.to_response_with_context(context))
}

fn session_from_headers(headers: &HeaderMap) -> AppResult<Session> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<Session>().ok())
        .ok_or(AppError::Unauthorized)
}

async fn authenticated_user(state: &AppState, headers: &HeaderMap) -> AppResult<(Session, User)> {
    let session = session_from_headers(headers)?;
    let user = state.identity.require_user(&session).await?;
    Ok((session, user))
}

// Auth endpoints

#[derive(Serialize)]
pub struct AuthResponse {
    pub session_id: Uuid,
    pub user: User,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    log_api_start!("login");
    let session = Session::new();
    let result = state
        .identity
        .login(&session, &request.email, &request.password)
        .await
        .map(|user| AuthResponse {
            session_id: session.id(),
            user,
        });
    respond(result, ErrorContext::new("login", "user"))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    log_api_start!("register");
    let session = Session::new();
    let result = state
        .identity
        .register(&session, &request.email, &request.password, &request.name)
        .await
        .map(|user| AuthResponse {
            session_id: session.id(),
            user,
        });
    respond(result, ErrorContext::new("register", "user"))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<()> {
    let result = async {
        let session = session_from_headers(&headers)?;
        log_api_start!("logout", session_id = session);
        if let Some(user) = state.identity.current_user(&session).await? {
            let evicted = state.quiz_sessions.remove_user(user.id).await;
            log_api_success!("logout", count = evicted, "quiz sessions evicted");
        }
        state.identity.logout(&session).await
    }
    .await;
    respond(result, ErrorContext::new("logout", "session"))
}

pub async fn current_user(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<User> {
    let result = authenticated_user(&state, &headers).await.map(|(_, user)| user);
    respond(result, ErrorContext::new("current_user", "user"))
}

// File endpoints

pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(upload): Json<FileUpload>,
) -> ApiResult<UploadedFile> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        log_api_start!("upload_file", user_id = user.id);
        validate_upload(&upload)?;
        state.content.upload_file(&user, upload).await
    }
    .await;
    respond(result, ErrorContext::new("upload_file", "file"))
}

pub async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<UploadedFile>> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        let files = state.content.user_files(&user).await?;
        log_api_success!("list_files", count = files.len(), "files listed");
        Ok::<_, AppError>(files)
    }
    .await;
    respond(result, ErrorContext::new("list_files", "file"))
}

// Quiz endpoints

pub async fn generate_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerateQuizRequest>,
) -> ApiResult<Quiz> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        log_api_start!("generate_quiz", user_id = user.id);
        let count = request.question_count.unwrap_or(DEFAULT_QUESTION_COUNT);
        state.content.generate_quiz(&user, request.file_id, count).await
    }
    .await;
    respond(
        result,
        ErrorContext::new("generate_quiz", "file").with_id(&request.file_id.to_string()),
    )
}

pub async fn list_quizzes(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Quiz>> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        let quizzes = state.content.user_quizzes(&user).await?;
        log_api_success!("list_quizzes", count = quizzes.len(), "quizzes listed");
        Ok::<_, AppError>(quizzes)
    }
    .await;
    respond(result, ErrorContext::new("list_quizzes", "quiz"))
}

pub async fn get_quiz(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(quiz_id): Path<Uuid>,
) -> ApiResult<Quiz> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        log_api_start!("get_quiz", quiz_id = quiz_id);
        state.content.find_user_quiz(&user, quiz_id).await
    }
    .await;
    respond(result, ErrorContext::new("get_quiz", "Quiz").with_id(&quiz_id.to_string()))
}

#[derive(Serialize)]
pub struct AttemptResponse {
    pub score: u32,
}

pub async fn submit_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(quiz_id): Path<Uuid>,
    Json(request): Json<SubmitAttemptRequest>,
) -> ApiResult<AttemptResponse> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        log_api_start!("submit_attempt", quiz_id = quiz_id);
        let score = state
            .attempts
            .submit_quiz_attempt(&user, quiz_id, request.answers, request.time_spent)
            .await?;
        log_api_success!("submit_attempt", quiz_id = quiz_id, format!("scored {}", score));
        Ok::<_, AppError>(AttemptResponse { score })
    }
    .await;
    respond(result, ErrorContext::new("submit_attempt", "Quiz").with_id(&quiz_id.to_string()))
}

pub async fn list_attempts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<QuizAttempt>> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        state.attempts.user_attempts(&user).await
    }
    .await;
    respond(result, ErrorContext::new("list_attempts", "attempt"))
}

pub async fn get_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<UserProgress> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        log_api_start!("get_progress", user_id = user.id);
        state.progress.user_progress(&user).await
    }
    .await;
    respond(result, ErrorContext::new("get_progress", "progress"))
}

// Quiz session endpoints

/// A question as shown while the quiz is running, without its answer.
#[derive(Serialize)]
pub struct QuestionView {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    pub options: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct QuizSessionView {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub title: String,
    pub total_questions: usize,
    pub question_index: Option<usize>,
    pub current_question: Option<QuestionView>,
    pub answers: HashMap<String, Answer>,
    pub can_advance: bool,
    pub can_submit: bool,
    pub submitted: bool,
    pub results: Option<QuizResults>,
}

impl From<&QuizSession> for QuizSessionView {
    fn from(session: &QuizSession) -> Self {
        let (question_index, answers) = match &session.state {
            SessionState::InProgress {
                question_index,
                answers,
            } => (Some(*question_index), answers.clone()),
            SessionState::Submitted { answers, .. } => (None, answers.clone()),
        };

        Self {
            id: session.id,
            quiz_id: session.quiz.id,
            title: session.quiz.title.clone(),
            total_questions: session.quiz.questions.len(),
            question_index,
            current_question: session.current_question().map(|q| QuestionView {
                id: q.id.clone(),
                question_type: q.question_type,
                question: q.question.clone(),
                options: q.options.clone(),
            }),
            answers,
            can_advance: session.can_advance(),
            can_submit: session.can_submit(),
            submitted: session.is_submitted(),
            results: session.results(),
        }
    }
}

pub async fn start_quiz_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StartQuizSessionRequest>,
) -> ApiResult<QuizSessionView> {
    let result = async {
        let (_, user) = authenticated_user(&state, &headers).await?;
        log_api_start!("start_quiz_session", quiz_id = request.quiz_id);
        let quiz = state.content.find_user_quiz(&user, request.quiz_id).await?;

        let pruned = state.quiz_sessions.prune_idle(Utc::now()).await;
        if pruned > 0 {
            log_api_success!("start_quiz_session", count = pruned, "idle quiz sessions pruned");
        }

        let session = QuizSession::new(&user, quiz);
        let view = QuizSessionView::from(&session);
        state.quiz_sessions.insert(session).await;

        log_api_success!("start_quiz_session", session_id = view.id, "quiz session started");
        Ok::<_, AppError>(view)
    }
    .await;
    respond(
        result,
        ErrorContext::new("start_quiz_session", "Quiz").with_id(&request.quiz_id.to_string()),
    )
}

enum SessionAction {
    View,
    Answer(SessionAnswerRequest),
    Next,
    Previous,
    Submit,
    Retake,
}

/// Loads the caller's quiz session, applies `action` and returns the new view.
async fn drive_session(
    state: &AppState,
    headers: &HeaderMap,
    session_id: Uuid,
    action: SessionAction,
) -> AppResult<QuizSessionView> {
    let (_, user) = authenticated_user(state, headers).await?;

    let handle = state.quiz_sessions.get(session_id, user.id).await.ok_or_else(|| {
        log_api_warn!("drive_session", session_id = session_id, "quiz session not found");
        AppError::NotFound(format!("Quiz session {} not found", session_id))
    })?;
    // Only this session stays locked while a submit writes the attempt.
    let mut session = handle.lock().await;

    match action {
        SessionAction::View => {}
        SessionAction::Answer(request) => session.answer(&request.question_id, &request.value)?,
        SessionAction::Next => session.next(),
        SessionAction::Previous => session.previous(),
        SessionAction::Submit => {
            let score = session.submit(&state.attempts, &user).await?;
            log_api_success!("submit_quiz_session", session_id = session_id, format!("scored {}", score));
        }
        SessionAction::Retake => session.retake()?,
    }

    Ok(QuizSessionView::from(&*session))
}

fn session_context(operation: &str, session_id: Uuid) -> ErrorContext {
    ErrorContext::new(operation, "Quiz session").with_id(&session_id.to_string())
}

pub async fn get_quiz_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizSessionView> {
    let result = drive_session(&state, &headers, session_id, SessionAction::View).await;
    respond(result, session_context("get_quiz_session", session_id))
}

pub async fn answer_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SessionAnswerRequest>,
) -> ApiResult<QuizSessionView> {
    let result = drive_session(&state, &headers, session_id, SessionAction::Answer(request)).await;
    respond(result, session_context("answer_question", session_id))
}

pub async fn next_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizSessionView> {
    let result = drive_session(&state, &headers, session_id, SessionAction::Next).await;
    respond(result, session_context("next_question", session_id))
}

pub async fn previous_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizSessionView> {
    let result = drive_session(&state, &headers, session_id, SessionAction::Previous).await;
    respond(result, session_context("previous_question", session_id))
}

pub async fn submit_quiz_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizSessionView> {
    let result = drive_session(&state, &headers, session_id, SessionAction::Submit).await;
    respond(result, session_context("submit_quiz_session", session_id))
}

pub async fn retake_quiz_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizSessionView> {
    let result = drive_session(&state, &headers, session_id, SessionAction::Retake).await;
    respond(result, session_context("retake_quiz_session", session_id))
}

// Subscription endpoints

#[derive(Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: SubscriptionPlan,
    pub display_price: String,
}

pub async fn list_plans() -> Json<ApiResponse<Vec<PlanView>>> {
    let plans = subscription_plans()
        .into_iter()
        .map(|plan| PlanView {
            display_price: format_currency(plan.price, plan.currency),
            plan,
        })
        .collect();
    Json(ApiResponse::success(plans))
}

pub async fn list_payment_methods(Path(country): Path<String>) -> Json<ApiResponse<Vec<SupportedMethod>>> {
    Json(ApiResponse::success(supported_methods(Country::parse(&country))))
}

pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<PaymentRecord> {
    let plan_id = request.plan_id.clone();
    let result = async {
        let session = session_from_headers(&headers)?;
        log_api_start!("checkout", session_id = session);
        state.subscriptions.checkout(&session, request).await
    }
    .await;
    respond(result, ErrorContext::new("checkout", "Plan").with_id(&plan_id))
}

pub async fn confirm_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<String>,
) -> ApiResult<PaymentRecord> {
    let result = async {
        let session = session_from_headers(&headers)?;
        log_api_start!("confirm_payment", session_id = session);
        state.subscriptions.confirm_payment(&session, &payment_id).await
    }
    .await;
    respond(result, ErrorContext::new("confirm_payment", "Payment").with_id(&payment_id))
}

pub async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("ok"))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Auth routes
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(current_user))
        // Content routes
        .route("/api/files", post(upload_file).get(list_files))
        .route("/api/quizzes", post(generate_quiz).get(list_quizzes))
        .route("/api/quizzes/:id", get(get_quiz))
        .route("/api/quizzes/:id/attempts", post(submit_attempt))
        .route("/api/attempts", get(list_attempts))
        .route("/api/progress", get(get_progress))
        // Quiz session routes
        .route("/api/quiz-sessions", post(start_quiz_session))
        .route("/api/quiz-sessions/:id", get(get_quiz_session))
        .route("/api/quiz-sessions/:id/answer", post(answer_question))
        .route("/api/quiz-sessions/:id/next", post(next_question))
        .route("/api/quiz-sessions/:id/previous", post(previous_question))
        .route("/api/quiz-sessions/:id/submit", post(submit_quiz_session))
        .route("/api/quiz-sessions/:id/retake", post(retake_quiz_session))
        // Subscription routes
        .route("/api/subscriptions/plans", get(list_plans))
        .route("/api/subscriptions/methods/:country", get(list_payment_methods))
        .route("/api/subscriptions/checkout", post(checkout))
        .route("/api/subscriptions/confirm/:payment_id", post(confirm_payment))
        .with_state(state)
}
