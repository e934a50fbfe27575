use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use study_aid::{
    api::{create_router, AppState, SESSION_HEADER},
    payments::MockPaymentProvider,
    providers::{MockQuizGenerator, MockTextExtractor},
    MemoryStore,
};
use uuid::Uuid;

fn create_test_state() -> AppState {
    AppState::with_services(
        Arc::new(MemoryStore::new()),
        Arc::new(MockTextExtractor::new(Duration::ZERO)),
        Arc::new(MockQuizGenerator::new(Duration::ZERO)),
        Arc::new(MockPaymentProvider::new(Duration::ZERO)),
        "http://localhost:3000".to_string(),
    )
}

fn create_test_server() -> TestServer {
    TestServer::new(create_router(create_test_state())).unwrap()
}

fn session_header(session_id: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(SESSION_HEADER),
        HeaderValue::from_str(session_id).unwrap(),
    )
}

async fn login_demo(server: &TestServer) -> String {
    let response = server
        .post("/api/auth/login")
        .json(&json!({"email": "demo@example.com", "password": "demo123"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["data"]["session_id"].as_str().unwrap().to_string()
}

async fn upload_and_generate(server: &TestServer, session_id: &str, count: usize) -> Value {
    let (name, value) = session_header(session_id);
    let upload = server
        .post("/api/files")
        .add_header(name.clone(), value.clone())
        .json(&json!({"name": "cells.pdf", "content_type": "application/pdf", "size": 2048}))
        .await;
    upload.assert_status_ok();
    let file: Value = upload.json();
    let file_id = file["data"]["id"].as_str().unwrap().to_string();

    let quiz = server
        .post("/api/quizzes")
        .add_header(name, value)
        .json(&json!({"file_id": file_id, "question_count": count}))
        .await;
    quiz.assert_status_ok();
    let body: Value = quiz.json();
    body["data"].clone()
}

#[tokio::test]
async fn test_api_health() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_api_login_and_me() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;

    let (name, value) = session_header(&session_id);
    let response = server.get("/api/auth/me").add_header(name, value).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["email"], "demo@example.com");
    assert_eq!(body["data"]["role"], "student");
    assert_eq!(body["data"]["is_premium"], false);
}

#[tokio::test]
async fn test_api_login_rejects_bad_credentials() {
    let server = create_test_server();
    let response = server
        .post("/api/auth/login")
        .json(&json!({"email": "x", "password": "y"}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_api_requires_session() {
    let server = create_test_server();

    let response = server.get("/api/quizzes").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let (name, value) = session_header(&Uuid::new_v4().to_string());
    let response = server.get("/api/quizzes").add_header(name, value).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_logout_ends_session() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);

    server
        .post("/api/auth/logout")
        .add_header(name.clone(), value.clone())
        .await
        .assert_status_ok();

    let response = server.get("/api/auth/me").add_header(name, value).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_rejects_non_pdf_upload() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);

    let response = server
        .post("/api/files")
        .add_header(name, value)
        .json(&json!({"name": "photo.png", "content_type": "image/png", "size": 10}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_generate_quiz_clamps_to_bank() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;

    let quiz = upload_and_generate(&server, &session_id, 20).await;
    assert_eq!(quiz["questions"].as_array().unwrap().len(), 3);
    assert_eq!(quiz["total_questions"], 3);
    assert_eq!(quiz["title"], "Quiz from uploaded document");
}

#[tokio::test]
async fn test_api_submit_attempt_and_progress() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);
    let quiz = upload_and_generate(&server, &session_id, 3).await;
    let quiz_id = quiz["id"].as_str().unwrap();

    let response = server
        .post(&format!("/api/quizzes/{}/attempts", quiz_id))
        .add_header(name.clone(), value.clone())
        .json(&json!({"answers": {"1": 1, "2": 0, "3": 0}, "time_spent": 42}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["score"], 67);

    let progress = server.get("/api/progress").add_header(name.clone(), value.clone()).await;
    progress.assert_status_ok();
    let body: Value = progress.json();
    assert_eq!(body["data"]["completed_quizzes"], 1);
    assert_eq!(body["data"]["average_score"], 67);
    assert_eq!(body["data"]["total_time_spent"], 42);

    let attempts = server.get("/api/attempts").add_header(name, value).await;
    let body: Value = attempts.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_api_submit_attempt_unknown_quiz() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);

    let response = server
        .post(&format!("/api/quizzes/{}/attempts", Uuid::new_v4()))
        .add_header(name, value)
        .json(&json!({"answers": {}}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_quiz_session_flow() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);
    let quiz = upload_and_generate(&server, &session_id, 3).await;

    let started = server
        .post("/api/quiz-sessions")
        .add_header(name.clone(), value.clone())
        .json(&json!({"quiz_id": quiz["id"]}))
        .await;
    started.assert_status_ok();
    let body: Value = started.json();
    let quiz_session_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["question_index"], 0);
    assert_eq!(body["data"]["can_advance"], false);
    assert!(body["data"]["current_question"].get("correct_answer").is_none());

    let base = format!("/api/quiz-sessions/{}", quiz_session_id);
    let answers = [("1", "1"), ("2", "0"), ("3", "2")];
    for (i, (question_id, answer)) in answers.iter().enumerate() {
        let response = server
            .post(&format!("{}/answer", base))
            .add_header(name.clone(), value.clone())
            .json(&json!({"question_id": question_id, "value": answer}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["can_advance"], true);

        if i < answers.len() - 1 {
            server
                .post(&format!("{}/next", base))
                .add_header(name.clone(), value.clone())
                .await
                .assert_status_ok();
        } else {
            assert_eq!(body["data"]["can_submit"], true);
        }
    }

    let submitted = server
        .post(&format!("{}/submit", base))
        .add_header(name.clone(), value.clone())
        .await;
    submitted.assert_status_ok();
    let body: Value = submitted.json();
    assert_eq!(body["data"]["submitted"], true);
    // The true/false answer is stored as the string "0" and never equals index 0.
    assert_eq!(body["data"]["results"]["score"], 67);
    assert_eq!(body["data"]["results"]["badge"], "Good Job!");

    let retaken = server
        .post(&format!("{}/retake", base))
        .add_header(name.clone(), value.clone())
        .await;
    retaken.assert_status_ok();
    let body: Value = retaken.json();
    assert_eq!(body["data"]["question_index"], 0);
    assert!(body["data"]["answers"].as_object().unwrap().is_empty());

    let attempts = server.get("/api/attempts").add_header(name, value).await;
    let body: Value = attempts.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_api_quiz_session_submit_blocked_until_answered() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);
    let quiz = upload_and_generate(&server, &session_id, 1).await;

    let started = server
        .post("/api/quiz-sessions")
        .add_header(name.clone(), value.clone())
        .json(&json!({"quiz_id": quiz["id"]}))
        .await;
    let body: Value = started.json();
    let quiz_session_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = server
        .post(&format!("/api/quiz-sessions/{}/submit", quiz_session_id))
        .add_header(name, value)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_quiz_session_hidden_from_other_users() {
    let server = create_test_server();
    let owner = login_demo(&server).await;
    let quiz = upload_and_generate(&server, &owner, 3).await;

    let (name, value) = session_header(&owner);
    let started = server
        .post("/api/quiz-sessions")
        .add_header(name, value)
        .json(&json!({"quiz_id": quiz["id"]}))
        .await;
    let body: Value = started.json();
    let quiz_session_id = body["data"]["id"].as_str().unwrap().to_string();

    let register = server
        .post("/api/auth/register")
        .json(&json!({"email": "other@example.com", "password": "pw", "name": "Other"}))
        .await;
    let body: Value = register.json();
    let other = body["data"]["session_id"].as_str().unwrap().to_string();

    let (name, value) = session_header(&other);
    let response = server
        .get(&format!("/api/quiz-sessions/{}", quiz_session_id))
        .add_header(name, value)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_list_plans_and_methods() {
    let server = create_test_server();

    let plans = server.get("/api/subscriptions/plans").await;
    plans.assert_status_ok();
    let body: Value = plans.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["data"][3]["display_price"], "USh 20,000");

    let methods = server.get("/api/subscriptions/methods/UG").await;
    let body: Value = methods.json();
    assert_eq!(body["data"][0]["method"], "AIRTEL-MONEY");
    assert_eq!(body["data"][0]["currency"], "UGX");
}

#[tokio::test]
async fn test_api_checkout_makes_user_premium() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);

    let checkout = server
        .post("/api/subscriptions/checkout")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "plan_id": "premium_monthly_kes",
            "country": "KE",
            "method": "MPESA",
            "email": "demo@example.com",
            "phone_number": "254712345678"
        }))
        .await;
    checkout.assert_status_ok();
    let body: Value = checkout.json();
    assert_eq!(body["data"]["state"], "PENDING");
    assert_eq!(body["data"]["amount"], 500);
    let payment_id = body["data"]["payment_id"].as_str().unwrap().to_string();

    let confirm = server
        .post(&format!("/api/subscriptions/confirm/{}", payment_id))
        .add_header(name.clone(), value.clone())
        .await;
    confirm.assert_status_ok();
    let body: Value = confirm.json();
    assert_eq!(body["data"]["state"], "COMPLETE");

    let me = server.get("/api/auth/me").add_header(name, value).await;
    let body: Value = me.json();
    assert_eq!(body["data"]["is_premium"], true);
}

#[tokio::test]
async fn test_api_free_tier_upload_limit() {
    let server = create_test_server();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);
    let upload = json!({"name": "notes.pdf", "content_type": "application/pdf", "size": 100});

    for _ in 0..3 {
        server
            .post("/api/files")
            .add_header(name.clone(), value.clone())
            .json(&upload)
            .await
            .assert_status_ok();
    }

    let response = server
        .post("/api/files")
        .add_header(name, value)
        .json(&upload)
        .await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);
}

async fn register(server: &TestServer, email: &str) -> String {
    let response = server
        .post("/api/auth/register")
        .json(&json!({"email": email, "password": "pw", "name": "Other"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    body["data"]["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_api_submit_attempt_on_foreign_quiz() {
    let server = create_test_server();
    let owner = login_demo(&server).await;
    let quiz = upload_and_generate(&server, &owner, 3).await;
    let quiz_id = quiz["id"].as_str().unwrap();

    let other = register(&server, "other@example.com").await;
    let (name, value) = session_header(&other);

    server
        .get(&format!("/api/quizzes/{}", quiz_id))
        .add_header(name.clone(), value.clone())
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let response = server
        .post(&format!("/api/quizzes/{}/attempts", quiz_id))
        .add_header(name.clone(), value.clone())
        .json(&json!({"answers": {"1": 1}}))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);

    let attempts = server.get("/api/attempts").add_header(name.clone(), value.clone()).await;
    let body: Value = attempts.json();
    assert!(body["data"].as_array().unwrap().is_empty());

    let progress = server.get("/api/progress").add_header(name, value).await;
    let body: Value = progress.json();
    assert_eq!(body["data"]["completed_quizzes"], 0);
}

#[tokio::test]
async fn test_api_logout_evicts_quiz_sessions() {
    let state = create_test_state();
    let server = TestServer::new(create_router(state.clone())).unwrap();
    let session_id = login_demo(&server).await;
    let (name, value) = session_header(&session_id);
    let quiz = upload_and_generate(&server, &session_id, 1).await;

    for _ in 0..5 {
        let started = server
            .post("/api/quiz-sessions")
            .add_header(name.clone(), value.clone())
            .json(&json!({"quiz_id": quiz["id"]}))
            .await;
        let body: Value = started.json();
        let base = format!("/api/quiz-sessions/{}", body["data"]["id"].as_str().unwrap());

        server
            .post(&format!("{}/answer", base))
            .add_header(name.clone(), value.clone())
            .json(&json!({"question_id": "1", "value": "1"}))
            .await
            .assert_status_ok();
        server
            .post(&format!("{}/submit", base))
            .add_header(name.clone(), value.clone())
            .await
            .assert_status_ok();
    }

    let other = register(&server, "other@example.com").await;
    let (other_name, other_value) = session_header(&other);
    let other_quiz = upload_and_generate(&server, &other, 1).await;
    server
        .post("/api/quiz-sessions")
        .add_header(other_name, other_value)
        .json(&json!({"quiz_id": other_quiz["id"]}))
        .await
        .assert_status_ok();
    assert_eq!(state.quiz_sessions.len().await, 6);

    server
        .post("/api/auth/logout")
        .add_header(name, value)
        .await
        .assert_status_ok();
    assert_eq!(state.quiz_sessions.len().await, 1);
}
