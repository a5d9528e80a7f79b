//! Server-sent snapshots of the catalog and of a candidate's history.
//!
//! A stream sends a full snapshot on connect, after every relevant change and
//! on a fixed resync interval, which also picks up writes made by the worker.
//! The feed subscription lives inside the stream and is released on disconnect.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::db::models::User;
use crate::repositories;
use crate::schemas::mock_test::MockTestResponse;
use crate::schemas::result::ResultResponse;
use crate::services::change_feed::{Notification, Topic};

const RESYNC_INTERVAL: Duration = Duration::from_secs(30);

fn snapshot_stream<F, Fut>(
    state: AppState,
    topic: Topic,
    load: F,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static
where
    F: Fn(AppState) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Event, ApiError>> + Send + 'static,
{
    let mut subscription = state.feed().subscribe(topic);

    stream! {
        let mut resync = tokio::time::interval(RESYNC_INTERVAL);
        resync.tick().await;
        let mut reason = "connect";

        loop {
            match load(state.clone()).await {
                Ok(event) => yield Ok(event),
                Err(err) => {
                    tracing::warn!(?err, reason, "Live snapshot failed");
                    yield Ok(Event::default().event("error").data("snapshot unavailable"));
                }
            }

            let next = tokio::select! {
                notification = subscription.next() => notification.map(|notification| match notification {
                    Notification::Changed => "changed",
                    Notification::Resync => "lagged",
                }),
                _ = resync.tick() => Some("interval"),
            };
            let Some(next) = next else { break };
            reason = next;
        }
    }
}

fn json_event<T: serde::Serialize>(name: &'static str, payload: &T) -> Result<Event, ApiError> {
    Event::default()
        .event(name)
        .json_data(payload)
        .map_err(|e| ApiError::internal(e, "Failed to encode live snapshot"))
}

async fn catalog_snapshot(state: AppState, open_only: bool) -> Result<Event, ApiError> {
    let tests = repositories::mock_tests::list(state.db(), open_only)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list tests"))?;
    let tests: Vec<MockTestResponse> = tests.into_iter().map(MockTestResponse::from_db).collect();
    json_event("catalog", &tests)
}

async fn history_snapshot(state: AppState, user_id: String) -> Result<Event, ApiError> {
    let results = repositories::exam_results::list_for_user(state.db(), &user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load results"))?;
    let results: Vec<ResultResponse> =
        results.into_iter().map(|result| ResultResponse::from_db(result, true)).collect();
    json_event("history", &results)
}

pub(crate) async fn catalog_stream(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let open_only = !user.role.is_staff();
    tracing::debug!(user_id = %user.id, "Catalog stream opened");

    let stream = snapshot_stream(state, Topic::Catalog, move |state| {
        catalog_snapshot(state, open_only)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub(crate) async fn history_stream(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let User { id: user_id, .. } = user;
    tracing::debug!(user_id = %user_id, "History stream opened");

    let topic = Topic::UserHistory(user_id.clone());
    let stream = snapshot_stream(state, topic, move |state| {
        history_snapshot(state, user_id.clone())
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
