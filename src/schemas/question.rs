use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Question, OPTION_COUNT};
use crate::schemas::double_option;
use crate::services::question_import::StagedQuestion;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionListQuery {
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    pub(crate) topic: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "skip must be non-negative"))]
    pub(crate) skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    #[validate(range(min = 1, max = 500, message = "limit must be between 1 and 500"))]
    pub(crate) limit: i64,
}

/// Partial edit. Fields left out keep their stored value; `explanation: null` clears it.
#[derive(Debug, Deserialize)]
pub(crate) struct QuestionUpdate {
    #[serde(default)]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    pub(crate) topic: Option<String>,
    #[serde(default, alias = "question")]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) options: Option<Vec<String>>,
    #[serde(default, alias = "correctIndex")]
    pub(crate) correct_index: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub(crate) explanation: Option<Option<String>>,
}

impl QuestionUpdate {
    /// Applies the edit to the stored question so the result can be validated as a whole.
    pub(crate) fn merged_with(&self, current: &Question) -> StagedQuestion {
        StagedQuestion {
            subject: self.subject.clone().unwrap_or_else(|| current.subject.clone()),
            topic: self.topic.clone().unwrap_or_else(|| current.topic.clone()),
            text: self.text.clone().unwrap_or_else(|| current.text.clone()),
            options: self.options.clone().unwrap_or_else(|| current.options.to_vec()),
            correct_index: self.correct_index.unwrap_or(i64::from(current.correct_index)),
            explanation: match &self.explanation {
                Some(explicit) => explicit.clone(),
                None => current.explanation.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) subject: String,
    pub(crate) topic: String,
    pub(crate) text: String,
    pub(crate) options: [String; OPTION_COUNT],
    pub(crate) correct_index: u8,
    pub(crate) explanation: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            subject: question.subject,
            topic: question.topic,
            text: question.text,
            options: question.options,
            correct_index: question.correct_index,
            explanation: question.explanation,
            created_by: question.created_by,
            created_at: format_primitive(question.created_at),
            updated_at: format_primitive(question.updated_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DedupRequest {
    #[serde(default)]
    pub(crate) confirm: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct DedupResponse {
    pub(crate) scanned: usize,
    pub(crate) kept: usize,
    pub(crate) removed: usize,
    pub(crate) removed_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImportExtractResponse {
    pub(crate) filename: String,
    pub(crate) count: usize,
    pub(crate) questions: Vec<StagedQuestion>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImportCommitRequest {
    pub(crate) questions: Vec<StagedQuestion>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImportCommitResponse {
    pub(crate) imported: usize,
    pub(crate) ids: Vec<String>,
    pub(crate) committed_at: String,
}
