mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::core::state::AppState;

/// Multipart framing on top of the PDF itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub(crate) fn router(max_import_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_questions).post(handlers::create_question))
        .route(
            "/:question_id",
            get(handlers::get_question)
                .patch(handlers::update_question)
                .delete(handlers::delete_question),
        )
        .route("/dedup", post(handlers::deduplicate))
        .route(
            "/import/extract",
            post(handlers::import_extract)
                .layer(DefaultBodyLimit::max(max_import_bytes + MULTIPART_OVERHEAD)),
        )
        .route("/import/commit", post(handlers::import_commit))
}

#[cfg(test)]
mod tests;
