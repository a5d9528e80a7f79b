use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::db::types::UserRole;
use crate::test_support::{self, TestContext};

async fn call(ctx: &TestContext, token: &str, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(method, uri, Some(token), body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

struct Finished {
    ctx: TestContext,
    admin_token: String,
    student_token: String,
    result_id: String,
    question_ids: Vec<String>,
}

/// One section of two questions (correct option 0); the student answers 0 then 1.
async fn finished_attempt() -> Finished {
    let ctx = test_support::setup_test_context().await;
    let admin =
        test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
    let student =
        test_support::insert_user(ctx.state.db(), "stu@x.test", "Stu", UserRole::Student).await;
    let first = test_support::insert_question(ctx.state.db(), "Physiology", "Q1", 0).await;
    let second = test_support::insert_question(ctx.state.db(), "Physiology", "Q2", 0).await;
    let test = test_support::insert_mock_test(
        ctx.state.db(),
        &admin,
        "Physiology Mock",
        &[("Cardio", vec![first.id.clone(), second.id.clone()])],
        600,
    )
    .await;
    let admin_token = test_support::bearer_token(&admin, ctx.state.settings());
    let student_token = test_support::bearer_token(&student, ctx.state.settings());

    let (status, started) =
        call(&ctx, &student_token, Method::POST, &format!("/api/v1/tests/{}/sessions", test.id), None)
            .await;
    assert_eq!(status, StatusCode::CREATED, "{started}");
    let base = format!("/api/v1/exam-sessions/{}", started["id"].as_str().expect("id"));
    call(&ctx, &student_token, Method::POST, &format!("{base}/sections/0/enter"), None).await;
    for (question, option) in [(0, 0), (1, 1)] {
        let (status, _) = call(
            &ctx,
            &student_token,
            Method::PUT,
            &format!("{base}/answers"),
            Some(json!({"question": question, "option": option})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
    call(&ctx, &student_token, Method::POST, &format!("{base}/sections/submit"), None).await;
    let (status, finished) =
        call(&ctx, &student_token, Method::POST, &format!("{base}/finish"), None).await;
    assert_eq!(status, StatusCode::OK, "{finished}");
    let result_id = finished["result"]["id"].as_str().expect("result id").to_string();

    Finished {
        ctx,
        admin_token,
        student_token,
        result_id,
        question_ids: vec![first.id, second.id],
    }
}

#[tokio::test]
async fn results_are_visible_to_owner_and_staff_only() {
    let fx = finished_attempt().await;
    let uri = format!("/api/v1/results/{}", fx.result_id);

    let (status, own) = call(&fx.ctx, &fx.student_token, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(own["score"], 1);
    assert_eq!(own["max_score"], 2);
    assert_eq!(own["percentage"], 50);
    assert_eq!(own["next_view"]["view"], "results");

    let (status, _) = call(&fx.ctx, &fx.admin_token, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let other = test_support::insert_user(
        fx.ctx.state.db(),
        "other@x.test",
        "Other",
        UserRole::Student,
    )
    .await;
    let other_token = test_support::bearer_token(&other, fx.ctx.state.settings());
    let (status, _) = call(&fx.ctx, &other_token, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, mine) = call(&fx.ctx, &other_token, Method::GET, "/api/v1/results/me", None).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(0));
    let (_, mine) = call(&fx.ctx, &fx.student_token, Method::GET, "/api/v1/results/me", None).await;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn review_marks_each_answer() {
    let fx = finished_attempt().await;

    let (status, review) = call(
        &fx.ctx,
        &fx.student_token,
        Method::GET,
        &format!("/api/v1/results/{}/review", fx.result_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(review["option_count"], 4);
    assert_eq!(review["next_view"]["view"], "review");
    assert_eq!(review["next_view"]["result_id"], fx.result_id.as_str());
    let items = review["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["question_id"], fx.question_ids[0].as_str());
    assert_eq!(items[0]["selected"], 0);
    assert_eq!(items[0]["correct_index"], 0);
    assert_eq!(items[0]["is_correct"], true);
    assert_eq!(items[1]["selected"], 1);
    assert_eq!(items[1]["is_correct"], false);
    assert_eq!(items[1]["explanation"], "Because.");
}

#[tokio::test]
async fn recalculate_reports_drift_without_rewriting_score() {
    let fx = finished_attempt().await;
    let recalc_uri = format!("/api/v1/results/{}/recalculate", fx.result_id);

    let (status, _) = call(&fx.ctx, &fx.student_token, Method::POST, &recalc_uri, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &fx.ctx,
        &fx.admin_token,
        Method::PATCH,
        &format!("/api/v1/questions/{}", fx.question_ids[1]),
        Some(json!({"correct_index": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, recalculated) =
        call(&fx.ctx, &fx.admin_token, Method::POST, &recalc_uri, None).await;
    assert_eq!(status, StatusCode::OK, "{recalculated}");
    assert_eq!(recalculated["stored_score"], 1);
    assert_eq!(recalculated["recalculated_score"], 2);
    assert_eq!(recalculated["drift"], 1);
    assert_eq!(recalculated["recalculated_percentage"], 100);

    let (_, stored) = call(
        &fx.ctx,
        &fx.student_token,
        Method::GET,
        &format!("/api/v1/results/{}", fx.result_id),
        None,
    )
    .await;
    assert_eq!(stored["score"], 1);
    assert!(stored["recalculated_at"].is_string());
}
