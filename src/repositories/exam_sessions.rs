use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::decode::DecodeError;
use crate::db::models::ExamSessionRow;
use crate::db::types::SessionStatus;
use crate::services::exam_engine::ExamEngine;

const COLUMNS: &str = "\
    id, test_id, user_id, state, status, started_at, expires_at, result_id, \
    created_at, updated_at";

pub(crate) fn decode_engine(row: &ExamSessionRow) -> Result<ExamEngine, DecodeError> {
    serde_json::from_value(row.state.0.clone())
        .map_err(|err| DecodeError::new("exam session", &row.id, format!("state: {err}")))
}

/// Row-locks the session for the rest of the surrounding transaction.
pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ExamSessionRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamSessionRow>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_any_active_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<ExamSessionRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamSessionRow>(&format!(
        "SELECT {COLUMNS} FROM exam_sessions WHERE user_id = $1 AND status = $2 \
         ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(user_id)
    .bind(SessionStatus::Active)
    .fetch_optional(pool)
    .await
}

pub(crate) struct CreateSession<'a> {
    pub(crate) id: &'a str,
    pub(crate) test_id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) engine: &'a ExamEngine,
    pub(crate) now: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateSession<'_>,
) -> Result<ExamSessionRow, sqlx::Error> {
    sqlx::query_as::<_, ExamSessionRow>(&format!(
        "INSERT INTO exam_sessions (
            id, test_id, user_id, state, status, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$6)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.test_id)
    .bind(params.user_id)
    .bind(Json(params.engine))
    .bind(SessionStatus::Active)
    .bind(params.now)
    .fetch_one(executor)
    .await
}

pub(crate) struct SaveSession<'a> {
    pub(crate) engine: &'a ExamEngine,
    pub(crate) status: SessionStatus,
    pub(crate) started_at: Option<time::PrimitiveDateTime>,
    pub(crate) expires_at: Option<time::PrimitiveDateTime>,
    pub(crate) result_id: Option<&'a str>,
    pub(crate) now: time::PrimitiveDateTime,
}

pub(crate) async fn save(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: SaveSession<'_>,
) -> Result<ExamSessionRow, sqlx::Error> {
    sqlx::query_as::<_, ExamSessionRow>(&format!(
        "UPDATE exam_sessions SET
            state = $1,
            status = $2,
            started_at = $3,
            expires_at = $4,
            result_id = COALESCE($5, result_id),
            updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}",
    ))
    .bind(Json(params.engine))
    .bind(params.status)
    .bind(params.started_at)
    .bind(params.expires_at)
    .bind(params.result_id)
    .bind(params.now)
    .bind(id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_expired_ids(
    pool: &PgPool,
    now: time::PrimitiveDateTime,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM exam_sessions
         WHERE status = $1 AND expires_at IS NOT NULL AND expires_at <= $2
         ORDER BY expires_at
         LIMIT $3",
    )
    .bind(SessionStatus::Active)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}
