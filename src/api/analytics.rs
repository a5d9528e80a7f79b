use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::analytics::{AnalyticsQuery, AnalyticsResponse};
use crate::services::analytics::{self, AnalyticsFilter};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(report))
}

/// Recomputed from the stored results on every request.
async fn report(
    Query(query): Query<AnalyticsQuery>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let filter = AnalyticsFilter::from(query);

    let results = repositories::exam_results::list_all(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load results"))?;
    let tests = repositories::mock_tests::list(state.db(), false)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load tests"))?;
    let questions = repositories::questions::list_all_lenient(state.db())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;

    let now = OffsetDateTime::now_utc();
    let timer = std::time::Instant::now();
    let report = analytics::build_report(&results, &tests, &questions, &filter, now);
    metrics::histogram!("analytics_report_seconds").record(timer.elapsed().as_secs_f64());

    tracing::debug!(
        user_id = %user.id,
        results = results.len(),
        selected = report.kpis.attempts,
        "Analytics report built"
    );
    Ok(Json(AnalyticsResponse::new(report, filter.window, now)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use tower::ServiceExt;

    use crate::db::types::UserRole;
    use crate::test_support;

    #[tokio::test]
    async fn analytics_is_staff_only_and_reports_kpis() {
        let ctx = test_support::setup_test_context().await;
        let admin =
            test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;
        let student =
            test_support::insert_user(ctx.state.db(), "stu@x.test", "Stu", UserRole::Student).await;

        let student_token = test_support::bearer_token(&student, ctx.state.settings());
        let forbidden = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/analytics",
                Some(&student_token),
                None,
            ))
            .await
            .expect("analytics");
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let admin_token = test_support::bearer_token(&admin, ctx.state.settings());
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/analytics?window=all&status=completed",
                Some(&admin_token),
                None,
            ))
            .await
            .expect("analytics");
        assert_eq!(response.status(), StatusCode::OK);
        let body = test_support::read_json(response).await;
        assert_eq!(body["window"], "all");
        assert_eq!(body["kpis"]["attempts"], 0);
        assert_eq!(body["trend"].as_array().map(Vec::len), Some(0));
    }
}
