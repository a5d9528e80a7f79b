use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStaff;
use crate::api::pagination::PaginatedResponse;
use crate::api::validation::{sanitized_filename, validate_pdf_upload};
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::repositories;
use crate::schemas::question::{
    DedupRequest, DedupResponse, ImportCommitRequest, ImportCommitResponse, ImportExtractResponse,
    QuestionListQuery, QuestionResponse, QuestionUpdate,
};
use crate::services::dedup;
use crate::services::question_import::{self, StagedQuestion};

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

pub(super) async fn list_questions(
    Query(query): Query<QuestionListQuery>,
    CurrentStaff(_user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<QuestionResponse>>, ApiError> {
    query.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let filter = repositories::questions::QuestionFilter {
        subject: non_blank(&query.subject),
        topic: non_blank(&query.topic),
    };
    let (questions, total_count) =
        repositories::questions::list(state.db(), filter, query.skip, query.limit)
            .await
            .map_err(|e| ApiError::store(e, "Failed to list questions"))?;

    Ok(Json(PaginatedResponse {
        items: questions.into_iter().map(QuestionResponse::from_db).collect(),
        total_count,
        skip: query.skip,
        limit: query.limit,
    }))
}

pub(super) async fn create_question(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<StagedQuestion>,
) -> Result<(StatusCode, Json<QuestionResponse>), ApiError> {
    let question = question_import::validate_one(&payload).map_err(ApiError::UnprocessableEntity)?;
    let id = Uuid::new_v4().to_string();

    let created = repositories::questions::create(
        state.db(),
        repositories::questions::CreateQuestion {
            id: &id,
            subject: &question.subject,
            topic: &question.topic,
            text: &question.text,
            options: &question.options,
            correct_index: question.correct_index,
            explanation: question.explanation.as_deref(),
            created_by: Some(&user.id),
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::store(e, "Failed to create question"))?;

    tracing::info!(user_id = %user.id, question_id = %created.id, action = "create_question", "Question created");
    Ok((StatusCode::CREATED, Json(QuestionResponse::from_db(created))))
}

pub(super) async fn get_question(
    Path(question_id): Path<String>,
    CurrentStaff(_user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let question = repositories::questions::find_by_id(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    Ok(Json(QuestionResponse::from_db(question)))
}

/// Edits in place. Results already recorded keep their stored score.
pub(super) async fn update_question(
    Path(question_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<QuestionUpdate>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let current = repositories::questions::find_by_id(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    let merged = payload.merged_with(&current);
    let question = question_import::validate_one(&merged).map_err(ApiError::UnprocessableEntity)?;

    let updated = repositories::questions::update(
        state.db(),
        &question_id,
        repositories::questions::UpdateQuestion {
            subject: &question.subject,
            topic: &question.topic,
            text: &question.text,
            options: &question.options,
            correct_index: question.correct_index,
            explanation: question.explanation.as_deref(),
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::store(e, "Failed to update question"))?
    .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    if current.correct_index != updated.correct_index {
        tracing::warn!(
            user_id = %user.id,
            question_id = %updated.id,
            previous = current.correct_index,
            current = updated.correct_index,
            "Answer key changed; recorded results are not rescored"
        );
    }
    Ok(Json(QuestionResponse::from_db(updated)))
}

pub(super) async fn delete_question(
    Path(question_id): Path<String>,
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let deleted = repositories::questions::delete(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question"))?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Question not found".to_string()));
    }

    tracing::info!(user_id = %user.id, question_id, action = "delete_question", "Question deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Removes later copies of questions with the same normalized text, all or nothing.
pub(super) async fn deduplicate(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<DedupRequest>,
) -> Result<Json<DedupResponse>, ApiError> {
    if !payload.confirm {
        return Err(ApiError::BadRequest("Deduplication requires confirm: true".to_string()));
    }

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to begin transaction"))?;
    let candidates = repositories::questions::list_dedup_candidates(&mut *tx)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to scan questions"))?;
    let plan = dedup::plan(&candidates);

    if !plan.removed.is_empty() {
        repositories::questions::delete_many(&mut *tx, &plan.removed)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to delete duplicate questions"))?;
    }
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit deduplication"))?;

    metrics::counter!("questions_deduplicated_total").increment(plan.removed.len() as u64);
    tracing::info!(
        user_id = %user.id,
        scanned = candidates.len(),
        removed = plan.removed.len(),
        action = "deduplicate",
        "Question bank deduplicated"
    );

    Ok(Json(DedupResponse {
        scanned: candidates.len(),
        kept: plan.kept.len(),
        removed: plan.removed.len(),
        removed_ids: plan.removed,
    }))
}

/// Stages questions from a PDF. Nothing is written to the bank.
pub(super) async fn import_extract(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImportExtractResponse>, ApiError> {
    let max_bytes = state.settings().import().max_import_bytes();
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        filename = field.file_name().map(str::to_string);
        content_type = field.content_type().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::PayloadTooLarge(format!(
                    "File size exceeds {}MB limit",
                    state.settings().import().max_import_size_mb
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        file_bytes = Some(bytes);
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;
    let filename = sanitized_filename(filename.as_deref().unwrap_or("upload.pdf"));
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    validate_pdf_upload(&filename, &content_type, &file_bytes)?;

    let questions = state.extraction().extract_questions(&filename, &file_bytes).await?;

    tracing::info!(
        user_id = %user.id,
        filename = %filename,
        staged = questions.len(),
        action = "import_extract",
        "Questions extracted for review"
    );
    Ok(Json(ImportExtractResponse { filename, count: questions.len(), questions }))
}

pub(super) async fn import_commit(
    CurrentStaff(user): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<ImportCommitRequest>,
) -> Result<(StatusCode, Json<ImportCommitResponse>), ApiError> {
    let validated = question_import::validate_batch(
        &payload.questions,
        state.settings().import().max_questions_per_batch,
    )?;

    let summary = question_import::commit_batch(state.db(), &user.id, &validated)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to import questions"))?;

    Ok((
        StatusCode::CREATED,
        Json(ImportCommitResponse {
            imported: summary.ids.len(),
            ids: summary.ids,
            committed_at: format_primitive(summary.committed_at),
        }),
    ))
}
