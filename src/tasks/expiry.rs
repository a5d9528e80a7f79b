//! Closes attempts whose countdown ran out while nobody was watching.
//!
//! Live requests already tick the engine before every step; this sweep covers
//! students who closed the tab. Each session goes through the same locked
//! `advance` path, so a sweep racing a request scores the attempt once.

use anyhow::{Context, Result};

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::attempt_finalize::{advance, no_op, AttemptError};

const SWEEP_BATCH: i64 = 200;

pub(crate) async fn close_expired_sessions(state: &AppState) -> Result<usize> {
    let ids = repositories::exam_sessions::list_expired_ids(state.db(), primitive_now_utc(), SWEEP_BATCH)
        .await
        .context("Failed to list expired sessions")?;

    let mut closed = 0;
    for session_id in &ids {
        match advance(state, session_id, None, no_op).await {
            Ok(snapshot) if snapshot.engine.is_finished() => {
                closed += 1;
                tracing::info!(
                    session_id = %session_id,
                    user_id = %snapshot.session.user_id,
                    result_id = snapshot.recorded.as_ref().map(|recorded| recorded.result.id.as_str()),
                    "Expired exam session auto-submitted"
                );
            }
            Ok(_) => {}
            // Deleted between listing and locking.
            Err(AttemptError::NotFound) => {}
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "Failed to close expired session");
            }
        }
    }

    tracing::info!(closed_sessions = closed, scanned = ids.len(), "Closed expired sessions");
    metrics::counter!("expired_sessions_closed_total").increment(closed as u64);
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::db::types::{ResultStatus, UserRole};
    use crate::test_support;

    #[tokio::test]
    async fn sweep_scores_abandoned_tabs_once() {
        let ctx = test_support::setup_test_context().await;
        let admin =
            test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
        let student =
            test_support::insert_user(ctx.state.db(), "stu@x.test", "Stu", UserRole::Student).await;
        let question = test_support::insert_question(ctx.state.db(), "Anatomy", "Q1", 0).await;
        let test = test_support::insert_mock_test(
            ctx.state.db(),
            &admin,
            "Sprint",
            &[("Only", vec![question.id.clone()])],
            1,
        )
        .await;
        let token = test_support::bearer_token(&student, ctx.state.settings());

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/tests/{}/sessions", test.id),
                Some(&token),
                None,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let started = test_support::read_json(response).await;
        let session_id = started["id"].as_str().expect("id").to_string();

        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/exam-sessions/{session_id}/sections/0/enter"),
                Some(&token),
                None,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(close_expired_sessions(&ctx.state).await.expect("sweep"), 0);
        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert_eq!(close_expired_sessions(&ctx.state).await.expect("sweep"), 1);
        assert_eq!(close_expired_sessions(&ctx.state).await.expect("sweep"), 0);

        let results = repositories::exam_results::list_for_user(ctx.state.db(), &student.id)
            .await
            .expect("results");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].score, 0);
        assert_eq!(results[0].status, ResultStatus::AutoSubmitted);
    }
}
