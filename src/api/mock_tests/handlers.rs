use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::exam_sessions::helpers::render_session;
use crate::api::guards::{CurrentRootAdmin, CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{MockTest, TestSection, User};
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::mock_test::{
    ApproveRequest, LeaderboardResponse, MockTestCreate, MockTestResponse, MockTestUpdate,
    PauseRequest, SectionInput,
};
use crate::schemas::session::StartSessionResponse;
use crate::services::analytics;
use crate::services::attempt_finalize::{advance, no_op};
use crate::services::attempt_policy;
use crate::services::change_feed::ChangeEvent;
use crate::services::exam_engine::ExamEngine;

fn build_sections(inputs: Vec<SectionInput>) -> Vec<TestSection> {
    inputs
        .into_iter()
        .map(|input| TestSection {
            id: input
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: input.name.trim().to_string(),
            question_ids: input.question_ids,
            marks_per_question: input.marks_per_question,
        })
        .collect()
}

/// Every referenced question must exist when the test is saved.
async fn ensure_questions_exist(state: &AppState, sections: &[TestSection]) -> Result<(), ApiError> {
    let wanted: BTreeSet<String> =
        sections.iter().flat_map(|section| section.question_ids.iter().cloned()).collect();
    if wanted.is_empty() {
        return Err(ApiError::UnprocessableEntity("A test needs at least one question".to_string()));
    }

    let ids: Vec<String> = wanted.iter().cloned().collect();
    let existing: BTreeSet<String> = repositories::questions::existing_ids(state.db(), &ids)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check question ids"))?
        .into_iter()
        .collect();

    let missing: Vec<&str> = wanted.difference(&existing).map(String::as_str).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::UnprocessableEntity(format!("Unknown question ids: {}", missing.join(", "))))
    }
}

/// Loads a test the user may see. Hidden tests look missing to students.
async fn visible_test(state: &AppState, user: &User, test_id: &str) -> Result<MockTest, ApiError> {
    let test = repositories::mock_tests::find_by_id(state.db(), test_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load test"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    if user.role.is_staff() || test.is_open_to_students() {
        Ok(test)
    } else {
        Err(ApiError::NotFound("Test not found".to_string()))
    }
}

pub(super) async fn list_tests(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MockTestResponse>>, ApiError> {
    let tests = repositories::mock_tests::list(state.db(), !user.role.is_staff())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tests"))?;

    Ok(Json(tests.into_iter().map(MockTestResponse::from_db).collect()))
}

pub(super) async fn create_test(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<MockTestCreate>,
) -> Result<(StatusCode, Json<MockTestResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let sections = build_sections(payload.sections);
    ensure_questions_exist(&state, &sections).await?;

    let test = repositories::mock_tests::create(
        state.db(),
        repositories::mock_tests::CreateMockTest {
            id: &Uuid::new_v4().to_string(),
            name: payload.name.trim(),
            description: payload.description.trim(),
            sections: &sections,
            duration_seconds: payload.duration_seconds,
            allow_retake: payload.allow_retake,
            max_attempts: payload.max_attempts,
            // Root admins approve their own tests by creating them.
            is_approved: user.role == UserRole::RootAdmin,
            created_by: &user.id,
            created_by_name: &user.display_name,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::store(e, "Failed to create test"))?;

    state.feed().publish(ChangeEvent::CatalogChanged);
    tracing::info!(user_id = %user.id, test_id = %test.id, action = "create_test", "Mock test created");
    Ok((StatusCode::CREATED, Json(MockTestResponse::from_db(test))))
}

pub(super) async fn get_test(
    Path(test_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<MockTestResponse>, ApiError> {
    let test = visible_test(&state, &user, &test_id).await?;
    Ok(Json(MockTestResponse::from_db(test)))
}

pub(super) async fn update_test(
    Path(test_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<MockTestUpdate>,
) -> Result<Json<MockTestResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if matches!(payload.max_attempts, Some(Some(max)) if max < 1) {
        return Err(ApiError::BadRequest("max_attempts must be positive".to_string()));
    }

    let sections = payload.sections.map(build_sections);
    if let Some(sections) = &sections {
        ensure_questions_exist(&state, sections).await?;
    }

    let test = repositories::mock_tests::update(
        state.db(),
        &test_id,
        repositories::mock_tests::UpdateMockTest {
            name: payload.name.map(|name| name.trim().to_string()),
            description: payload.description,
            sections,
            duration_seconds: payload.duration_seconds,
            allow_retake: payload.allow_retake,
            max_attempts: payload.max_attempts,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::store(e, "Failed to update test"))?
    .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    state.feed().publish(ChangeEvent::CatalogChanged);
    tracing::info!(user_id = %user.id, test_id = %test.id, action = "update_test", "Mock test updated");
    Ok(Json(MockTestResponse::from_db(test)))
}

pub(super) async fn delete_test(
    Path(test_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::mock_tests::delete(state.db(), &test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete test"))?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Test not found".to_string()));
    }

    state.feed().publish(ChangeEvent::CatalogChanged);
    tracing::info!(user_id = %user.id, test_id, action = "delete_test", "Mock test deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn approve_test(
    Path(test_id): Path<String>,
    CurrentRootAdmin(user): CurrentRootAdmin,
    State(state): State<AppState>,
    Json(payload): Json<ApproveRequest>,
) -> Result<Json<MockTestResponse>, ApiError> {
    let test =
        repositories::mock_tests::set_approved(state.db(), &test_id, payload.approved, primitive_now_utc())
            .await
            .map_err(|e| ApiError::store(e, "Failed to update approval"))?
            .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    state.feed().publish(ChangeEvent::CatalogChanged);
    tracing::info!(
        user_id = %user.id,
        test_id = %test.id,
        approved = payload.approved,
        action = "approve_test",
        "Mock test approval changed"
    );
    Ok(Json(MockTestResponse::from_db(test)))
}

pub(super) async fn pause_test(
    Path(test_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<PauseRequest>,
) -> Result<Json<MockTestResponse>, ApiError> {
    let test =
        repositories::mock_tests::set_paused(state.db(), &test_id, payload.paused, primitive_now_utc())
            .await
            .map_err(|e| ApiError::store(e, "Failed to update pause state"))?
            .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;

    state.feed().publish(ChangeEvent::CatalogChanged);
    tracing::info!(
        user_id = %user.id,
        test_id = %test.id,
        paused = payload.paused,
        action = "pause_test",
        "Mock test pause changed"
    );
    Ok(Json(MockTestResponse::from_db(test)))
}

pub(super) async fn leaderboard(
    Path(test_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let test = visible_test(&state, &user, &test_id).await?;
    let results = repositories::exam_results::list_for_test(state.db(), &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load results"))?;

    Ok(Json(LeaderboardResponse {
        test_id: test.id,
        test_name: test.name,
        entries: analytics::leaderboard(&results).into_iter().map(Into::into).collect(),
    }))
}

/// Starts an attempt, or resumes the one already running for this test.
pub(super) async fn start_session(
    Path(test_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<StartSessionResponse>), ApiError> {
    if let Some(running) = repositories::exam_sessions::find_any_active_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to look up active sessions"))?
    {
        // Let an expired attempt close before deciding between resume and conflict.
        let snapshot = advance(&state, &running.id, Some(&user.id), no_op).await?;
        if !snapshot.engine.is_finished() {
            if running.test_id != test_id {
                return Err(ApiError::Conflict(
                    "Finish or abandon the exam in progress first".to_string(),
                ));
            }
            tracing::info!(user_id = %user.id, session_id = %running.id, "Exam session resumed");
            let session = render_session(&state, snapshot, user.role).await?;
            return Ok((StatusCode::OK, Json(StartSessionResponse { resumed: true, session })));
        }
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;

    let test = repositories::mock_tests::find_by_id(&mut *tx, &test_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load test"))?
        .ok_or_else(|| ApiError::NotFound("Test not found".to_string()))?;
    let prior_attempts = repositories::exam_results::count_attempts(&mut *tx, &user.id, &test.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;
    attempt_policy::check_start(&test, user.role, prior_attempts)?;

    let engine = ExamEngine::new(&test);
    let session_id = Uuid::new_v4().to_string();
    repositories::exam_sessions::create(
        &mut *tx,
        repositories::exam_sessions::CreateSession {
            id: &session_id,
            test_id: &test.id,
            user_id: &user.id,
            engine: &engine,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            ApiError::Conflict("Another exam attempt is already running".to_string())
        }
        _ => ApiError::internal(e, "Failed to create exam session"),
    })?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit exam session"))?;

    metrics::counter!("exam_sessions_started_total").increment(1);
    tracing::info!(
        user_id = %user.id,
        test_id = %test.id,
        session_id = %session_id,
        prior_attempts,
        action = "start_exam",
        "Exam session started"
    );

    let snapshot = advance(&state, &session_id, Some(&user.id), no_op).await?;
    let session = render_session(&state, snapshot, user.role).await?;
    Ok((StatusCode::CREATED, Json(StartSessionResponse { resumed: false, session })))
}
