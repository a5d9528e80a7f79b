use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::db::types::UserRole;
use crate::test_support;

fn staged(text: &str, correct_index: i64) -> serde_json::Value {
    json!({
        "subject": "Physiology",
        "topic": "Cardiac",
        "text": text,
        "options": ["A", "B", "C", "D"],
        "correct_index": correct_index,
        "explanation": "See Guyton."
    })
}

fn multipart_pdf(uri: &str, token: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let boundary = "medcbt-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .expect("multipart request")
}

#[tokio::test]
async fn staff_create_edit_and_delete_questions() {
    let ctx = test_support::setup_test_context().await;
    let admin =
        test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let created = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/questions",
            Some(&token),
            Some(staged("Normal stroke volume?", 1)),
        ))
        .await
        .expect("create");
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = test_support::read_json(created).await;
    let id = created["id"].as_str().expect("id").to_string();
    assert_eq!(created["created_by"], admin.id.as_str());

    let patched = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &format!("/api/v1/questions/{id}"),
            Some(&token),
            Some(json!({"correct_index": 3, "explanation": null})),
        ))
        .await
        .expect("patch");
    assert_eq!(patched.status(), StatusCode::OK);
    let patched = test_support::read_json(patched).await;
    assert_eq!(patched["correct_index"], 3);
    assert!(patched["explanation"].is_null());
    assert_eq!(patched["text"], "Normal stroke volume?");

    let invalid = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PATCH,
            &format!("/api/v1/questions/{id}"),
            Some(&token),
            Some(json!({"options": ["only", "three", "options"]})),
        ))
        .await
        .expect("invalid patch");
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let listed = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/questions?subject=physiology&limit=10",
            Some(&token),
            None,
        ))
        .await
        .expect("list");
    let listed = test_support::read_json(listed).await;
    assert_eq!(listed["total_count"], 1);

    let deleted = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/questions/{id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("delete");
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            &format!("/api/v1/questions/{id}"),
            Some(&token),
            None,
        ))
        .await
        .expect("get");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn students_cannot_read_the_bank() {
    let ctx = test_support::setup_test_context().await;
    let student =
        test_support::insert_user(ctx.state.db(), "stu@x.test", "Stu", UserRole::Student).await;
    let token = test_support::bearer_token(&student, ctx.state.settings());

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/questions", Some(&token), None))
        .await
        .expect("list");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dedup_requires_confirmation_and_keeps_first_copy() {
    let ctx = test_support::setup_test_context().await;
    let admin =
        test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let first = test_support::insert_question(ctx.state.db(), "Anatomy", "Which nerve?", 0).await;
    test_support::insert_question(ctx.state.db(), "Anatomy", "Other question", 0).await;
    let copy = test_support::insert_question(ctx.state.db(), "Anatomy", "  WHICH   nerve? ", 1).await;

    let unconfirmed = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/questions/dedup",
            Some(&token),
            Some(json!({})),
        ))
        .await
        .expect("dedup");
    assert_eq!(unconfirmed.status(), StatusCode::BAD_REQUEST);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/questions/dedup",
            Some(&token),
            Some(json!({"confirm": true})),
        ))
        .await
        .expect("dedup");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["scanned"], 3);
    assert_eq!(body["removed"], 1);
    assert_eq!(body["removed_ids"], json!([copy.id]));

    let kept = crate::repositories::questions::find_by_id(ctx.state.db(), &first.id)
        .await
        .expect("lookup");
    assert!(kept.is_some());
}

#[tokio::test]
async fn import_commit_is_all_or_nothing() {
    let ctx = test_support::setup_test_context().await;
    let admin =
        test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let rejected = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/questions/import/commit",
            Some(&token),
            Some(json!({"questions": [staged("Valid", 0), staged("Bad index", 4)]})),
        ))
        .await
        .expect("commit");
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let detail = test_support::read_json(rejected).await;
    assert!(detail["detail"].as_str().unwrap_or_default().contains("question 2"));

    let committed = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/questions/import/commit",
            Some(&token),
            Some(json!({"questions": [staged("First", 0), staged("Second", 2)]})),
        ))
        .await
        .expect("commit");
    assert_eq!(committed.status(), StatusCode::CREATED);
    let body = test_support::read_json(committed).await;
    assert_eq!(body["imported"], 2);

    let (all, total) = crate::repositories::questions::list(
        ctx.state.db(),
        crate::repositories::questions::QuestionFilter::default(),
        0,
        10,
    )
    .await
    .expect("list");
    assert_eq!(total, 2);
    assert!(all.iter().all(|question| question.created_by.as_deref() == Some(admin.id.as_str())));
}

#[tokio::test]
async fn import_extract_validates_pdf_and_requires_ai_config() {
    let ctx = test_support::setup_test_context().await;
    let admin =
        test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
    let token = test_support::bearer_token(&admin, ctx.state.settings());

    let not_pdf = ctx
        .app
        .clone()
        .oneshot(multipart_pdf("/api/v1/questions/import/extract", &token, "paper.pdf", b"hello"))
        .await
        .expect("extract");
    assert_eq!(not_pdf.status(), StatusCode::BAD_REQUEST);

    let unconfigured = ctx
        .app
        .clone()
        .oneshot(multipart_pdf(
            "/api/v1/questions/import/extract",
            &token,
            "paper.pdf",
            b"%PDF-1.4\n%fake\n",
        ))
        .await
        .expect("extract");
    assert_eq!(unconfigured.status(), StatusCode::SERVICE_UNAVAILABLE);
}
