use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::exam_sessions::helpers::render_session;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::schemas::session::{AbandonRequest, AnswerRequest, NavigateRequest, SessionResponse};
use crate::services::attempt_finalize::{advance, no_op};
use crate::services::exam_engine::ExamEngine;
use crate::services::scoring::AnswerKey;

pub(super) async fn get_session(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = advance(&state, &session_id, Some(&user.id), no_op).await?;
    Ok(Json(render_session(&state, snapshot, user.role).await?))
}

pub(super) async fn enter_section(
    Path((session_id, index)): Path<(String, usize)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = advance(
        &state,
        &session_id,
        Some(&user.id),
        move |engine: &mut ExamEngine, now, _: &AnswerKey| {
            let entry = engine.enter_section(index, now)?;
            tracing::debug!(section = index, ?entry, "Section entry");
            Ok(None)
        },
    )
    .await?;
    Ok(Json(render_session(&state, snapshot, user.role).await?))
}

pub(super) async fn navigate(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = advance(
        &state,
        &session_id,
        Some(&user.id),
        move |engine: &mut ExamEngine, _, _: &AnswerKey| {
            engine.navigate(payload.question)?;
            Ok(None)
        },
    )
    .await?;
    Ok(Json(render_session(&state, snapshot, user.role).await?))
}

pub(super) async fn select_answer(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = advance(
        &state,
        &session_id,
        Some(&user.id),
        move |engine: &mut ExamEngine, _, _: &AnswerKey| {
            engine.select_option(payload.question, payload.option)?;
            Ok(None)
        },
    )
    .await?;
    Ok(Json(render_session(&state, snapshot, user.role).await?))
}

pub(super) async fn submit_section(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = advance(
        &state,
        &session_id,
        Some(&user.id),
        |engine: &mut ExamEngine, _, _: &AnswerKey| {
            engine.submit_section()?;
            Ok(None)
        },
    )
    .await?;
    Ok(Json(render_session(&state, snapshot, user.role).await?))
}

/// Final submission. Rejected, with nothing changed, while any section is still open.
pub(super) async fn finish(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let snapshot = advance(
        &state,
        &session_id,
        Some(&user.id),
        |engine: &mut ExamEngine, _, key: &AnswerKey| engine.finalize(key).map(Some),
    )
    .await?;
    Ok(Json(render_session(&state, snapshot, user.role).await?))
}

pub(super) async fn abandon(
    Path(session_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AbandonRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    if !payload.confirm {
        return Err(ApiError::BadRequest("Abandoning an exam requires confirm: true".to_string()));
    }

    let snapshot = advance(
        &state,
        &session_id,
        Some(&user.id),
        |engine: &mut ExamEngine, _, _: &AnswerKey| {
            engine.abandon()?;
            Ok(None)
        },
    )
    .await?;

    if !snapshot.deadline_passed {
        metrics::counter!("exam_sessions_abandoned_total").increment(1);
    }
    Ok(Json(render_session(&state, snapshot, user.role).await?))
}
