mod handlers;
pub(crate) mod helpers;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:session_id", get(handlers::get_session))
        .route("/:session_id/sections/submit", post(handlers::submit_section))
        .route("/:session_id/sections/:index/enter", post(handlers::enter_section))
        .route("/:session_id/navigate", post(handlers::navigate))
        .route("/:session_id/answers", put(handlers::select_answer))
        .route("/:session_id/finish", post(handlers::finish))
        .route("/:session_id/abandon", post(handlers::abandon))
}

#[cfg(test)]
mod tests;
