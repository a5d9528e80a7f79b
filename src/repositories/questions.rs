use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::db::models::{Question, QuestionRow, OPTION_COUNT};
use crate::repositories::StoreError;
use crate::services::dedup::DedupCandidate;

const COLUMNS: &str = "\
    id, subject, topic, text, options, correct_index, explanation, \
    created_by, created_at, updated_at";

#[derive(Debug, Default)]
pub(crate) struct QuestionFilter<'a> {
    pub(crate) subject: Option<&'a str>,
    pub(crate) topic: Option<&'a str>,
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &QuestionFilter<'a>) {
    builder.push(" WHERE TRUE");
    if let Some(subject) = filter.subject {
        builder.push(" AND lower(subject) = lower(").push_bind(subject).push(")");
    }
    if let Some(topic) = filter.topic {
        builder.push(" AND lower(topic) = lower(").push_bind(topic).push(")");
    }
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, StoreError> {
    let row = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Question::try_from).transpose()?)
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: QuestionFilter<'_>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<Question>, i64), StoreError> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM questions");
    push_filters(&mut count, &filter);
    let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM questions"));
    push_filters(&mut builder, &filter);
    builder.push(" ORDER BY created_at DESC, id OFFSET ").push_bind(skip);
    builder.push(" LIMIT ").push_bind(limit);

    let rows = builder.build_query_as::<QuestionRow>().fetch_all(pool).await?;
    let items = rows.into_iter().map(Question::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok((items, total))
}

/// Every question, skipping documents that fail to decode.
pub(crate) async fn list_all_lenient(pool: &PgPool) -> Result<Vec<Question>, sqlx::Error> {
    let rows = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {COLUMNS} FROM questions ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;
    Ok(crate::db::decode::decode_lenient(rows))
}

pub(crate) async fn find_many(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<Vec<Question>, StoreError> {
    let rows = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(Question::try_from).collect::<Result<Vec<_>, _>>()?)
}

pub(crate) async fn existing_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM questions WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(pool)
        .await
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) subject: &'a str,
    pub(crate) topic: &'a str,
    pub(crate) text: &'a str,
    pub(crate) options: &'a [String; OPTION_COUNT],
    pub(crate) correct_index: u8,
    pub(crate) explanation: Option<&'a str>,
    pub(crate) created_by: Option<&'a str>,
    pub(crate) now: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateQuestion<'_>,
) -> Result<Question, StoreError> {
    let row = sqlx::query_as::<_, QuestionRow>(&format!(
        "INSERT INTO questions (
            id, subject, topic, text, options, correct_index, explanation,
            created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$9)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.subject)
    .bind(params.topic)
    .bind(params.text)
    .bind(Json(params.options))
    .bind(i16::from(params.correct_index))
    .bind(params.explanation)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(executor)
    .await?;

    Ok(Question::try_from(row)?)
}

pub(crate) struct UpdateQuestion<'a> {
    pub(crate) subject: &'a str,
    pub(crate) topic: &'a str,
    pub(crate) text: &'a str,
    pub(crate) options: &'a [String; OPTION_COUNT],
    pub(crate) correct_index: u8,
    pub(crate) explanation: Option<&'a str>,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

/// Rewrites the question in place. Results already recorded keep their stored scores.
pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateQuestion<'_>,
) -> Result<Option<Question>, StoreError> {
    let row = sqlx::query_as::<_, QuestionRow>(&format!(
        "UPDATE questions SET
            subject = $1,
            topic = $2,
            text = $3,
            options = $4,
            correct_index = $5,
            explanation = $6,
            updated_at = $7
         WHERE id = $8
         RETURNING {COLUMNS}",
    ))
    .bind(params.subject)
    .bind(params.topic)
    .bind(params.text)
    .bind(Json(params.options))
    .bind(i16::from(params.correct_index))
    .bind(params.explanation)
    .bind(params.updated_at)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Question::try_from).transpose()?)
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM questions WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected())
}

#[derive(Debug, FromRow)]
struct DedupRow {
    id: String,
    text: String,
    created_at: time::PrimitiveDateTime,
}

pub(crate) async fn list_dedup_candidates(
    executor: impl sqlx::PgExecutor<'_>,
) -> Result<Vec<DedupCandidate>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DedupRow>(
        "SELECT id, text, created_at FROM questions ORDER BY created_at, id",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DedupCandidate { id: row.id, text: row.text, created_at: row.created_at })
        .collect())
}

pub(crate) async fn delete_many(
    executor: impl sqlx::PgExecutor<'_>,
    ids: &[String],
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM questions WHERE id = ANY($1)").bind(ids).execute(executor).await?;
    Ok(result.rows_affected())
}
