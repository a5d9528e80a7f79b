use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::db::models::{MockTest, User};
use crate::db::types::UserRole;
use crate::test_support::{self, TestContext};

struct Fixture {
    ctx: TestContext,
    student: User,
    token: String,
    test: MockTest,
}

/// Two sections of two questions; every correct answer is option 1.
async fn fixture(duration_seconds: i32) -> Fixture {
    let ctx = test_support::setup_test_context().await;
    let admin =
        test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
    let student =
        test_support::insert_user(ctx.state.db(), "stu@x.test", "Stu", UserRole::Student).await;

    let mut ids = Vec::new();
    for text in ["Q1", "Q2", "Q3", "Q4"] {
        ids.push(test_support::insert_question(ctx.state.db(), "Anatomy", text, 1).await.id);
    }
    let test = test_support::insert_mock_test(
        ctx.state.db(),
        &admin,
        "Anatomy Mock",
        &[("Upper limb", ids[..2].to_vec()), ("Lower limb", ids[2..].to_vec())],
        duration_seconds,
    )
    .await;
    let token = test_support::bearer_token(&student, ctx.state.settings());

    Fixture { ctx, student, token, test }
}

impl Fixture {
    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let response = self
            .ctx
            .app
            .clone()
            .oneshot(test_support::json_request(method, uri, Some(&self.token), body))
            .await
            .expect("response");
        let status = response.status();
        (status, test_support::read_json(response).await)
    }

    async fn start(&self) -> String {
        let (status, body) =
            self.call(Method::POST, &format!("/api/v1/tests/{}/sessions", self.test.id), None).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().expect("session id").to_string()
    }
}

#[tokio::test]
async fn full_attempt_scores_and_lands_on_results() {
    let fx = fixture(600).await;
    let session = fx.start().await;
    let base = format!("/api/v1/exam-sessions/{session}");

    let (status, lobby) = fx.call(Method::GET, &base, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lobby["phase"]["kind"], "lobby");
    assert_eq!(lobby["timer_running"], false);
    assert_eq!(lobby["remaining_seconds"], 600);

    let (_, entered) = fx.call(Method::POST, &format!("{base}/sections/0/enter"), None).await;
    assert_eq!(entered["phase"]["kind"], "testing");
    assert_eq!(entered["timer_running"], true);
    let questions = entered["sections"][0]["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 2);
    assert!(questions[0].get("correct_index").is_none());
    assert!(entered["sections"][1].get("questions").is_none());

    fx.call(Method::PUT, &format!("{base}/answers"), Some(json!({"question": 0, "option": 1}))).await;
    fx.call(Method::POST, &format!("{base}/navigate"), Some(json!({"question": 1}))).await;
    let (_, answered) =
        fx.call(Method::PUT, &format!("{base}/answers"), Some(json!({"question": 1, "option": 3}))).await;
    assert_eq!(answered["answered"], 2);
    assert_eq!(answered["phase"]["question"], 1);

    let (_, submitted) = fx.call(Method::POST, &format!("{base}/sections/submit"), None).await;
    assert_eq!(submitted["phase"]["kind"], "lobby");
    assert_eq!(submitted["sections"][0]["submitted"], true);

    fx.call(Method::POST, &format!("{base}/sections/1/enter"), None).await;
    fx.call(Method::PUT, &format!("{base}/answers"), Some(json!({"question": 0, "option": 1}))).await;
    fx.call(Method::POST, &format!("{base}/sections/submit"), None).await;

    let (status, finished) = fx.call(Method::POST, &format!("{base}/finish"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(finished["status"], "finished");
    assert_eq!(finished["result"]["status"], "completed");
    assert_eq!(finished["result"]["score"], 2);
    assert_eq!(finished["result"]["max_score"], 4);
    assert_eq!(finished["result"]["percentage"], 50);
    assert_eq!(finished["result"]["persisted"], true);
    assert_eq!(finished["result"]["section_breakdown"][0]["score"], 1);
    assert_eq!(finished["next_view"]["view"], "results");
    assert_eq!(finished["next_view"]["result_id"], finished["result"]["id"]);

    let (status, _) = fx.call(Method::PUT, &format!("{base}/answers"), Some(json!({"question": 0, "option": 2}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, history) = fx.call(Method::GET, "/api/v1/results/me", None).await;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn finishing_with_open_sections_changes_nothing() {
    let fx = fixture(600).await;
    let session = fx.start().await;
    let base = format!("/api/v1/exam-sessions/{session}");

    fx.call(Method::POST, &format!("{base}/sections/0/enter"), None).await;
    fx.call(Method::POST, &format!("{base}/sections/submit"), None).await;

    let (status, body) = fx.call(Method::POST, &format!("{base}/finish"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].as_str().unwrap_or_default().contains("1"));

    let (_, after) = fx.call(Method::GET, &base, None).await;
    assert_eq!(after["status"], "active");
    assert_eq!(after["pending_sections"], 1);
    assert!(after["result"].is_null());

    let (_, reentered) = fx.call(Method::POST, &format!("{base}/sections/0/enter"), None).await;
    assert_eq!(reentered["phase"]["kind"], "lobby");
    assert_eq!(reentered["sections"][0]["submitted"], true);
}

#[tokio::test]
async fn expired_countdown_auto_submits_on_next_request() {
    let fx = fixture(1).await;
    let session = fx.start().await;
    let base = format!("/api/v1/exam-sessions/{session}");

    fx.call(Method::POST, &format!("{base}/sections/0/enter"), None).await;
    tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

    let (status, body) =
        fx.call(Method::PUT, &format!("{base}/answers"), Some(json!({"question": 0, "option": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deadline_passed"], true);
    assert_eq!(body["remaining_seconds"], 0);
    assert_eq!(body["result"]["status"], "auto-submitted");
    assert_eq!(body["result"]["score"], 0);
    assert_eq!(body["result"]["answered"], 0);
}

#[tokio::test]
async fn abandon_needs_confirmation_and_records_nothing() {
    let fx = fixture(600).await;
    let session = fx.start().await;
    let base = format!("/api/v1/exam-sessions/{session}");

    let (status, _) = fx.call(Method::POST, &format!("{base}/abandon"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        fx.call(Method::POST, &format!("{base}/abandon"), Some(json!({"confirm": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "abandoned");
    assert!(body["result"].is_null());
    assert_eq!(body["next_view"]["view"], "dashboard");

    let results = crate::repositories::exam_results::list_for_user(fx.ctx.state.db(), &fx.student.id)
        .await
        .expect("results");
    assert!(results.is_empty());
}

#[tokio::test]
async fn sessions_of_other_users_are_hidden() {
    let fx = fixture(600).await;
    let session = fx.start().await;

    let other =
        test_support::insert_user(fx.ctx.state.db(), "other@x.test", "Other", UserRole::Student)
            .await;
    let other_token = test_support::bearer_token(&other, fx.ctx.state.settings());
    let response = fx
        .ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/exam-sessions/{session}"),
            Some(&other_token),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_moves_are_client_errors() {
    let fx = fixture(600).await;
    let session = fx.start().await;
    let base = format!("/api/v1/exam-sessions/{session}");

    let (status, _) = fx.call(Method::POST, &format!("{base}/sections/9/enter"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        fx.call(Method::PUT, &format!("{base}/answers"), Some(json!({"question": 0, "option": 1}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    fx.call(Method::POST, &format!("{base}/sections/0/enter"), None).await;
    let (status, _) =
        fx.call(Method::PUT, &format!("{base}/answers"), Some(json!({"question": 0, "option": 4}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
