use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use study_aid::{
    providers::{MockQuizGenerator, MockTextExtractor},
    AppError, AttemptRecorder, Answer, ContentStore, FileUpload, IdentityStore, JsonStore,
    KeyValueStore, MemoryStore, ProgressAggregator, QuizSession, Session, SessionState,
    SqliteStore, User,
};

struct Services {
    identity: IdentityStore,
    content: ContentStore,
    attempts: AttemptRecorder,
    progress: ProgressAggregator,
}

fn services(store: Arc<dyn KeyValueStore>) -> Services {
    let json = JsonStore::new(store);
    let identity = IdentityStore::new(json.clone());
    let content = ContentStore::new(
        json.clone(),
        Arc::new(MockTextExtractor::new(Duration::ZERO)),
        Arc::new(MockQuizGenerator::new(Duration::ZERO)),
    );
    let attempts = AttemptRecorder::new(json, content.clone());
    let progress = ProgressAggregator::new(content.clone(), attempts.clone());
    Services {
        identity,
        content,
        attempts,
        progress,
    }
}

async fn premium_user(services: &Services) -> User {
    let session = Session::new();
    let mut user = services
        .identity
        .login(&session, "demo@example.com", "demo123")
        .await
        .unwrap();
    user.is_premium = true;
    services.identity.update_current_user(&session, &user).await.unwrap();
    user
}

fn pdf(name: &str) -> FileUpload {
    FileUpload {
        name: name.to_string(),
        content_type: "application/pdf".to_string(),
        size: 4096,
    }
}

fn perfect_answers() -> HashMap<String, Answer> {
    HashMap::from([
        ("1".to_string(), Answer::Index(1)),
        ("2".to_string(), Answer::Index(0)),
        ("3".to_string(), Answer::Index(2)),
    ])
}

#[tokio::test]
async fn test_upload_then_generate_clamps_to_bank() {
    let services = services(Arc::new(MemoryStore::new()));
    let user = premium_user(&services).await;

    let file = services.content.upload_file(&user, pdf("biology.pdf")).await.unwrap();
    assert!(file.extracted_text.contains("biology.pdf"));

    let quiz = services.content.generate_quiz(&user, file.id, 20).await.unwrap();
    assert_eq!(quiz.questions.len(), 3);
    assert_eq!(quiz.total_questions, 3);
    assert_eq!(quiz.source_file, file.id);

    let quizzes = services.content.user_quizzes(&user).await.unwrap();
    assert_eq!(quizzes.len(), 1);
}

#[tokio::test]
async fn test_generate_quiz_rejects_zero_and_unknown_file() {
    let services = services(Arc::new(MemoryStore::new()));
    let user = premium_user(&services).await;
    let file = services.content.upload_file(&user, pdf("notes.pdf")).await.unwrap();

    let zero = services.content.generate_quiz(&user, file.id, 0).await;
    assert!(matches!(zero, Err(AppError::ValidationError(_))));

    let missing = services.content.generate_quiz(&user, uuid::Uuid::new_v4(), 3).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_each_submission_appends_one_attempt() {
    let services = services(Arc::new(MemoryStore::new()));
    let user = premium_user(&services).await;
    let file = services.content.upload_file(&user, pdf("a.pdf")).await.unwrap();
    let quiz = services.content.generate_quiz(&user, file.id, 3).await.unwrap();

    for expected in 1..=3 {
        let score = services
            .attempts
            .submit_quiz_attempt(&user, quiz.id, perfect_answers(), 10)
            .await
            .unwrap();
        assert_eq!(score, 100);
        assert_eq!(services.attempts.user_attempts(&user).await.unwrap().len(), expected);
    }
}

#[tokio::test]
async fn test_submit_rejects_unknown_quiz_and_foreign_question() {
    let services = services(Arc::new(MemoryStore::new()));
    let user = premium_user(&services).await;

    let unknown = services
        .attempts
        .submit_quiz_attempt(&user, uuid::Uuid::new_v4(), HashMap::new(), 0)
        .await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));

    let file = services.content.upload_file(&user, pdf("a.pdf")).await.unwrap();
    let quiz = services.content.generate_quiz(&user, file.id, 3).await.unwrap();
    let answers = HashMap::from([("99".to_string(), Answer::Index(0))]);
    let foreign = services.attempts.submit_quiz_attempt(&user, quiz.id, answers, 0).await;
    assert!(matches!(foreign, Err(AppError::ValidationError(_))));
    assert!(services.attempts.user_attempts(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_after_one_and_five_attempts() {
    let services = services(Arc::new(MemoryStore::new()));
    let user = premium_user(&services).await;
    let file = services.content.upload_file(&user, pdf("a.pdf")).await.unwrap();
    let quiz = services.content.generate_quiz(&user, file.id, 3).await.unwrap();

    let progress = services.progress.user_progress(&user).await.unwrap();
    assert_eq!(progress.total_quizzes, 1);
    assert_eq!(progress.completed_quizzes, 0);
    assert_eq!(progress.average_score, 0);

    services
        .attempts
        .submit_quiz_attempt(&user, quiz.id, perfect_answers(), 30)
        .await
        .unwrap();
    let progress = services.progress.user_progress(&user).await.unwrap();
    assert_eq!(progress.completed_quizzes, 1);
    assert_eq!(progress.average_score, 100);
    assert_eq!(progress.total_time_spent, 30);
    assert_eq!(progress.strengths, vec!["Critical Thinking", "Problem Solving"]);

    // Four more attempts scoring 0 bring the mean to 20.
    for _ in 0..4 {
        services
            .attempts
            .submit_quiz_attempt(&user, quiz.id, HashMap::new(), 5)
            .await
            .unwrap();
    }
    let progress = services.progress.user_progress(&user).await.unwrap();
    assert_eq!(progress.completed_quizzes, 5);
    assert_eq!(progress.average_score, 20);
    assert_eq!(progress.total_time_spent, 50);
    assert!(progress.strengths.is_empty());
    assert_eq!(progress.weaknesses, vec!["Concept Understanding", "Application"]);
}

#[tokio::test]
async fn test_quiz_session_submit_and_retake() {
    let services = services(Arc::new(MemoryStore::new()));
    let user = premium_user(&services).await;
    let file = services.content.upload_file(&user, pdf("a.pdf")).await.unwrap();
    let quiz = services.content.generate_quiz(&user, file.id, 3).await.unwrap();

    let mut session = QuizSession::new(&user, quiz);
    assert!(!session.can_advance());

    session.answer("1", "1").unwrap();
    session.next();
    session.answer("2", "true").unwrap();
    session.next();
    session.answer("3", "2").unwrap();
    session.next();
    assert!(session.can_submit());

    let score = session.submit(&services.attempts, &user).await.unwrap();
    assert_eq!(score, 67);
    assert!(session.is_submitted());
    assert!(session.answer("1", "0").is_err());

    let results = session.results().unwrap();
    assert_eq!(results.correct, 2);
    assert_eq!(results.total, 3);
    assert_eq!(results.badge, "Good Job!");
    assert!(!results.review[1].is_correct);

    session.retake().unwrap();
    assert!(matches!(
        &session.state,
        SessionState::InProgress { question_index: 0, answers } if answers.is_empty()
    ));
    assert!(session.retake().is_err());
    assert_eq!(services.attempts.user_attempts(&user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_flow_on_sqlite_store() {
    let store = SqliteStore::new("sqlite::memory:").await.unwrap();
    let services = services(Arc::new(store));
    let user = premium_user(&services).await;

    let file = services.content.upload_file(&user, pdf("history.pdf")).await.unwrap();
    let quiz = services.content.generate_quiz(&user, file.id, 2).await.unwrap();
    assert_eq!(quiz.questions.len(), 2);

    let answers = HashMap::from([("1".to_string(), Answer::Index(1))]);
    let score = services
        .attempts
        .submit_quiz_attempt(&user, quiz.id, answers, 12)
        .await
        .unwrap();
    assert_eq!(score, 50);

    let found = services.content.find_quiz(quiz.id).await.unwrap();
    assert_eq!(found.map(|q| q.id), Some(quiz.id));
}

#[tokio::test]
async fn test_generator_with_empty_bank_fails_without_storing() {
    let json = JsonStore::new(Arc::new(MemoryStore::new()));
    let content = ContentStore::new(
        json,
        Arc::new(MockTextExtractor::new(Duration::ZERO)),
        Arc::new(MockQuizGenerator::with_bank(Duration::ZERO, Vec::new())),
    );
    let user = User {
        id: uuid::Uuid::now_v7(),
        email: "empty@example.com".to_string(),
        name: "Empty".to_string(),
        role: study_aid::Role::Student,
        is_premium: false,
    };

    let file = content.upload_file(&user, pdf("blank.pdf")).await.unwrap();
    let result = content.generate_quiz(&user, file.id, 3).await;
    assert!(matches!(result, Err(AppError::InternalError(_))));
    assert!(content.user_quizzes(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_generator_with_custom_bank_serves_its_questions() {
    let services = services(Arc::new(MemoryStore::new()));
    let user = premium_user(&services).await;
    let bank: Vec<_> = study_aid::providers::question_bank().into_iter().rev().collect();
    let content = ContentStore::new(
        JsonStore::new(Arc::new(MemoryStore::new())),
        Arc::new(MockTextExtractor::new(Duration::ZERO)),
        Arc::new(MockQuizGenerator::with_bank(Duration::ZERO, bank)),
    );

    let file = content.upload_file(&user, pdf("reversed.pdf")).await.unwrap();
    let quiz = content.generate_quiz(&user, file.id, 2).await.unwrap();
    let ids: Vec<&str> = quiz.questions.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "2"]);
}
