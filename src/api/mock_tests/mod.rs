mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::live;
use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_tests).post(handlers::create_test))
        .route("/live", get(live::catalog_stream))
        .route(
            "/:test_id",
            get(handlers::get_test).patch(handlers::update_test).delete(handlers::delete_test),
        )
        .route("/:test_id/approve", post(handlers::approve_test))
        .route("/:test_id/pause", post(handlers::pause_test))
        .route("/:test_id/leaderboard", get(handlers::leaderboard))
        .route("/:test_id/sessions", post(handlers::start_session))
}
