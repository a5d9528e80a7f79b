//! Typed decoding of JSON columns into domain values.
//!
//! Rows come out of Postgres with their document columns as raw JSON; every
//! conversion here either yields a fully validated domain value or a
//! [`DecodeError`] naming the entity and the offending field.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::db::models::{
    ExamResult, ExamResultRow, MockTest, MockTestRow, Question, QuestionRow, SectionBreakdown,
    TestSection, OPTION_COUNT,
};

#[derive(Debug, Error)]
#[error("malformed {entity} {id}: {reason}")]
pub(crate) struct DecodeError {
    pub(crate) entity: &'static str,
    pub(crate) id: String,
    pub(crate) reason: String,
}

impl DecodeError {
    pub(crate) fn new(entity: &'static str, id: &str, reason: impl Into<String>) -> Self {
        Self { entity, id: id.to_string(), reason: reason.into() }
    }
}

fn field<T: DeserializeOwned>(
    entity: &'static str,
    id: &str,
    name: &str,
    value: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|err| DecodeError::new(entity, id, format!("{name}: {err}")))
}

pub(crate) fn option_index(value: i64) -> Option<u8> {
    u8::try_from(value).ok().filter(|index| usize::from(*index) < OPTION_COUNT)
}

impl TryFrom<QuestionRow> for Question {
    type Error = DecodeError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let options: Vec<String> = field("question", &row.id, "options", row.options.0)?;
        let count = options.len();
        let options: [String; OPTION_COUNT] = options.try_into().map_err(|_| {
            DecodeError::new("question", &row.id, format!("expected 4 options, found {count}"))
        })?;
        let correct_index = option_index(i64::from(row.correct_index)).ok_or_else(|| {
            DecodeError::new(
                "question",
                &row.id,
                format!("correct_index {} out of range", row.correct_index),
            )
        })?;

        Ok(Question {
            id: row.id,
            subject: row.subject,
            topic: row.topic,
            text: row.text,
            options,
            correct_index,
            explanation: row.explanation,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<MockTestRow> for MockTest {
    type Error = DecodeError;

    fn try_from(row: MockTestRow) -> Result<Self, Self::Error> {
        let sections: Vec<TestSection> = field("test", &row.id, "sections", row.sections.0)?;
        if let Some(section) = sections.iter().find(|section| section.marks_per_question <= 0) {
            return Err(DecodeError::new(
                "test",
                &row.id,
                format!("section {} has non-positive marks_per_question", section.id),
            ));
        }
        if row.duration_seconds <= 0 {
            return Err(DecodeError::new("test", &row.id, "duration_seconds must be positive"));
        }

        Ok(MockTest {
            id: row.id,
            name: row.name,
            description: row.description,
            sections,
            duration_seconds: row.duration_seconds,
            allow_retake: row.allow_retake,
            max_attempts: row.max_attempts,
            is_approved: row.is_approved,
            is_paused: row.is_paused,
            created_by: row.created_by,
            created_by_name: row.created_by_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<ExamResultRow> for ExamResult {
    type Error = DecodeError;

    fn try_from(row: ExamResultRow) -> Result<Self, Self::Error> {
        let raw_answers: BTreeMap<String, i64> =
            field("result", &row.id, "user_answers", row.user_answers.0)?;
        let mut user_answers = BTreeMap::new();
        for (question_id, choice) in raw_answers {
            let index = option_index(choice).ok_or_else(|| {
                DecodeError::new(
                    "result",
                    &row.id,
                    format!("answer {choice} for {question_id} out of range"),
                )
            })?;
            user_answers.insert(question_id, index);
        }
        let section_breakdown: Vec<SectionBreakdown> =
            field("result", &row.id, "section_breakdown", row.section_breakdown.0)?;

        Ok(ExamResult {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            test_id: row.test_id,
            test_name: row.test_name,
            score: row.score,
            max_score: row.max_score,
            status: row.status,
            user_answers,
            section_breakdown,
            completed_at: row.completed_at,
            recalculated_at: row.recalculated_at,
        })
    }
}

/// Decodes a batch of rows, dropping malformed ones with a warning.
///
/// Used by read-only aggregations where one corrupt document must not hide
/// the rest of the data set.
pub(crate) fn decode_lenient<R, T>(rows: Vec<R>) -> Vec<T>
where
    T: TryFrom<R, Error = DecodeError>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(
                    entity = err.entity,
                    id = %err.id,
                    reason = %err.reason,
                    "Skipping malformed record"
                );
                metrics::counter!("decode_failures_total", "entity" => err.entity).increment(1);
                None
            }
        })
        .collect()
}
