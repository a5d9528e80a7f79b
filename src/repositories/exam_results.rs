use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::decode::decode_lenient;
use crate::db::models::{ExamResult, ExamResultRow};
use crate::db::types::ResultStatus;
use crate::repositories::StoreError;
use crate::services::exam_engine::AttemptOutcome;

const COLUMNS: &str = "\
    id, user_id, user_name, test_id, test_name, score, max_score, status, \
    user_answers, section_breakdown, completed_at, recalculated_at";

pub(crate) struct CreateResult<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) user_name: &'a str,
    pub(crate) test_id: &'a str,
    pub(crate) test_name: &'a str,
    pub(crate) outcome: &'a AttemptOutcome,
    pub(crate) completed_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateResult<'_>,
) -> Result<ExamResult, StoreError> {
    let row = sqlx::query_as::<_, ExamResultRow>(&format!(
        "INSERT INTO exam_results (
            id, user_id, user_name, test_id, test_name, score, max_score, status,
            user_answers, section_breakdown, completed_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.user_name)
    .bind(params.test_id)
    .bind(params.test_name)
    .bind(params.outcome.sheet.score)
    .bind(params.outcome.sheet.max_score)
    .bind(params.outcome.status)
    .bind(Json(&params.outcome.answers))
    .bind(Json(&params.outcome.sheet.sections))
    .bind(params.completed_at)
    .fetch_one(executor)
    .await?;

    Ok(ExamResult::try_from(row)?)
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ExamResult>, StoreError> {
    let row = sqlx::query_as::<_, ExamResultRow>(&format!(
        "SELECT {COLUMNS} FROM exam_results WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ExamResult::try_from).transpose()?)
}

pub(crate) async fn list_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<ExamResult>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ExamResultRow>(&format!(
        "SELECT {COLUMNS} FROM exam_results WHERE user_id = $1 ORDER BY completed_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(decode_lenient(rows))
}

pub(crate) async fn list_for_test(
    pool: &PgPool,
    test_id: &str,
) -> Result<Vec<ExamResult>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ExamResultRow>(&format!(
        "SELECT {COLUMNS} FROM exam_results WHERE test_id = $1 ORDER BY completed_at, id"
    ))
    .bind(test_id)
    .fetch_all(pool)
    .await?;

    Ok(decode_lenient(rows))
}

pub(crate) async fn list_all(pool: &PgPool) -> Result<Vec<ExamResult>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ExamResultRow>(&format!(
        "SELECT {COLUMNS} FROM exam_results ORDER BY completed_at, id"
    ))
    .fetch_all(pool)
    .await?;

    Ok(decode_lenient(rows))
}

/// Attempts that count against retake limits.
pub(crate) async fn count_attempts(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    test_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM exam_results WHERE user_id = $1 AND test_id = $2 AND status <> $3",
    )
    .bind(user_id)
    .bind(test_id)
    .bind(ResultStatus::Abandoned)
    .fetch_one(executor)
    .await
}

pub(crate) async fn mark_recalculated(
    pool: &PgPool,
    id: &str,
    now: time::PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exam_results SET recalculated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
