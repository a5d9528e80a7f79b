use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{ExamResult, TestSection, User};
use crate::repositories;
use crate::schemas::result::{
    RecalculateResponse, ResultDetailResponse, ResultResponse, ReviewItem, ReviewResponse,
};
use crate::services::portal::{self, Action, View};
use crate::services::scoring;

/// Loads a result visible to `user`: their own, or any result for staff.
async fn visible_result(state: &AppState, user: &User, result_id: &str) -> Result<ExamResult, ApiError> {
    let result = repositories::exam_results::find_by_id(state.db(), result_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load result"))?
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

    if result.user_id == user.id || user.role.is_staff() {
        Ok(result)
    } else {
        Err(ApiError::NotFound("Result not found".to_string()))
    }
}

pub(super) async fn my_results(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ResultResponse>>, ApiError> {
    let results = repositories::exam_results::list_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load results"))?;

    Ok(Json(results.into_iter().map(|result| ResultResponse::from_db(result, true)).collect()))
}

pub(super) async fn get_result(
    Path(result_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ResultDetailResponse>, ApiError> {
    let result = visible_result(&state, &user, &result_id).await?;
    let next_view = portal::dispatch(
        &portal::home(user.role),
        Some(user.role),
        Action::OpenResults { result_id: result.id.clone() },
    );

    Ok(Json(ResultDetailResponse { result: ResultResponse::from_db(result, true), next_view }))
}

/// Sections to walk for a review. Falls back to the answered ids when the test is gone.
fn review_sections(test_sections: Option<Vec<TestSection>>, result: &ExamResult) -> Vec<TestSection> {
    test_sections.unwrap_or_else(|| {
        vec![TestSection {
            id: String::new(),
            name: "Answered questions".to_string(),
            question_ids: result.user_answers.keys().cloned().collect(),
            marks_per_question: 1,
        }]
    })
}

pub(super) async fn review(
    Path(result_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let result = visible_result(&state, &user, &result_id).await?;
    let test = repositories::mock_tests::find_by_id(state.db(), &result.test_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load test"))?;
    let sections = review_sections(test.map(|test| test.sections), &result);

    let mut ids: Vec<String> =
        sections.iter().flat_map(|section| section.question_ids.iter().cloned()).collect();
    ids.sort();
    ids.dedup();
    let questions = repositories::questions::find_many(state.db(), &ids)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load questions"))?;
    let key = scoring::answer_key(&questions);

    let mut items = Vec::new();
    for section in &sections {
        for (position, question_id) in section.question_ids.iter().enumerate() {
            let question = questions.iter().find(|question| &question.id == question_id);
            items.push(ReviewItem {
                section: section.name.clone(),
                position,
                question_id: question_id.clone(),
                available: question.is_some(),
                text: question.map(|q| q.text.clone()).unwrap_or_default(),
                options: question.map(|q| q.options.to_vec()).unwrap_or_default(),
                selected: result.user_answers.get(question_id).copied(),
                correct_index: question.map(|q| q.correct_index),
                is_correct: scoring::is_correct(&key, &result.user_answers, question_id),
                explanation: question.and_then(|q| q.explanation.clone()),
            });
        }
    }

    let next_view = portal::dispatch(
        &View::Results { result_id: result.id.clone() },
        Some(user.role),
        Action::OpenReview { result_id: result.id.clone() },
    );
    Ok(Json(ReviewResponse::new(ResultResponse::from_db(result, true), items, next_view)))
}

/// Rescores against the current answer key. The stored score is left untouched.
pub(super) async fn recalculate(
    Path(result_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<RecalculateResponse>, ApiError> {
    let result = visible_result(&state, &user, &result_id).await?;
    let test = repositories::mock_tests::find_by_id(state.db(), &result.test_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load test"))?
        .ok_or_else(|| ApiError::Conflict("The test for this result no longer exists".to_string()))?;

    let mut ids: Vec<String> = test.question_ids().map(str::to_string).collect();
    ids.sort();
    ids.dedup();
    let questions = repositories::questions::find_many(state.db(), &ids)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load questions"))?;
    let key = scoring::answer_key(&questions);
    let sheet = scoring::score_attempt(&test.sections, &key, &result.user_answers);

    let now = primitive_now_utc();
    repositories::exam_results::mark_recalculated(state.db(), &result.id, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to stamp recalculation"))?;

    let drift = sheet.score - result.score;
    if drift != 0 {
        tracing::warn!(
            user_id = %user.id,
            result_id = %result.id,
            stored = result.score,
            recalculated = sheet.score,
            "Result drifted from current answer key"
        );
    }

    Ok(Json(RecalculateResponse {
        result_id: result.id,
        stored_score: result.score,
        recalculated_score: sheet.score,
        max_score: sheet.max_score,
        stored_percentage: scoring::percentage(result.score, result.max_score),
        recalculated_percentage: sheet.percentage(),
        drift,
        sections: sheet.sections,
        recalculated_at: format_primitive(now),
    }))
}
