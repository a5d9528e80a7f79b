use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::db::decode::option_index;
use crate::db::models::OPTION_COUNT;
use crate::repositories;

/// A question as extracted or edited before it is committed to the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub(crate) struct StagedQuestion {
    #[validate(length(min = 1, message = "subject must not be empty"), custom(function = not_blank))]
    pub(crate) subject: String,
    #[validate(length(min = 1, message = "topic must not be empty"), custom(function = not_blank))]
    pub(crate) topic: String,
    #[serde(alias = "question")]
    #[validate(length(min = 1, message = "text must not be empty"), custom(function = not_blank))]
    pub(crate) text: String,
    #[validate(
        length(equal = 4, message = "exactly 4 options are required"),
        custom(function = options_filled)
    )]
    pub(crate) options: Vec<String>,
    #[serde(alias = "correctIndex", alias = "answer_index")]
    #[validate(range(min = 0, max = 3, message = "correct_index must be between 0 and 3"))]
    pub(crate) correct_index: i64,
    #[serde(default)]
    pub(crate) explanation: Option<String>,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

fn options_filled(options: &[String]) -> Result<(), ValidationError> {
    if options.iter().any(|option| option.trim().is_empty()) {
        return Err(ValidationError::new("blank_option").with_message("options must not be blank".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NewQuestion {
    pub(crate) subject: String,
    pub(crate) topic: String,
    pub(crate) text: String,
    pub(crate) options: [String; OPTION_COUNT],
    pub(crate) correct_index: u8,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ImportError {
    #[error("no questions to import")]
    Empty,
    #[error("{count} questions exceed the batch limit of {max}")]
    TooMany { count: usize, max: usize },
    #[error("question {position}: {reason}")]
    Invalid { position: usize, reason: String },
}

#[derive(Debug, Clone)]
pub(crate) struct CommitSummary {
    pub(crate) ids: Vec<String>,
    pub(crate) committed_at: time::PrimitiveDateTime,
}

/// Checks one staged entry and returns it trimmed, ready for insertion.
pub(crate) fn validate_one(item: &StagedQuestion) -> Result<NewQuestion, String> {
    item.validate().map_err(|errors| errors.to_string())?;

    let mut options: [String; OPTION_COUNT] = Default::default();
    for (slot, option) in options.iter_mut().zip(&item.options) {
        *slot = option.trim().to_string();
    }
    let correct_index = option_index(item.correct_index)
        .ok_or_else(|| format!("correct_index {} must be between 0 and 3", item.correct_index))?;
    let explanation = item
        .explanation
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    Ok(NewQuestion {
        subject: item.subject.trim().to_string(),
        topic: item.topic.trim().to_string(),
        text: item.text.trim().to_string(),
        options,
        correct_index,
        explanation,
    })
}

/// Validates a whole staged list. Any invalid entry rejects the batch.
pub(crate) fn validate_batch(
    staged: &[StagedQuestion],
    max: usize,
) -> Result<Vec<NewQuestion>, ImportError> {
    if staged.is_empty() {
        return Err(ImportError::Empty);
    }
    if staged.len() > max {
        return Err(ImportError::TooMany { count: staged.len(), max });
    }

    staged
        .iter()
        .enumerate()
        .map(|(index, item)| {
            validate_one(item).map_err(|reason| ImportError::Invalid { position: index + 1, reason })
        })
        .collect()
}

/// Writes the reviewed batch in one transaction, tagged with the acting admin.
pub(crate) async fn commit_batch(
    pool: &sqlx::PgPool,
    actor_id: &str,
    questions: &[NewQuestion],
) -> anyhow::Result<CommitSummary> {
    let committed_at = crate::core::time::primitive_now_utc();
    let mut tx = pool.begin().await.context("failed to begin import transaction")?;
    let mut ids = Vec::with_capacity(questions.len());

    for question in questions {
        let id = Uuid::new_v4().to_string();
        repositories::questions::create(
            &mut *tx,
            repositories::questions::CreateQuestion {
                id: &id,
                subject: &question.subject,
                topic: &question.topic,
                text: &question.text,
                options: &question.options,
                correct_index: question.correct_index,
                explanation: question.explanation.as_deref(),
                created_by: Some(actor_id),
                now: committed_at,
            },
        )
        .await
        .with_context(|| format!("failed to insert imported question {}", ids.len() + 1))?;
        ids.push(id);
    }

    tx.commit().await.context("failed to commit import transaction")?;

    metrics::counter!("questions_imported_total").increment(ids.len() as u64);
    tracing::info!(actor_id, imported = ids.len(), "Committed question import batch");

    Ok(CommitSummary { ids, committed_at })
}
