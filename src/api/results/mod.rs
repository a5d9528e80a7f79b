mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::live;
use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(handlers::my_results))
        .route("/me/live", get(live::history_stream))
        .route("/:result_id", get(handlers::get_result))
        .route("/:result_id/review", get(handlers::review))
        .route("/:result_id/recalculate", post(handlers::recalculate))
}

#[cfg(test)]
mod tests;
