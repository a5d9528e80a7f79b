use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::{ExamResult, SectionBreakdown, OPTION_COUNT};
use crate::db::types::ResultStatus;
use crate::services::portal::View;
use crate::services::scoring;

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) user_name: String,
    pub(crate) test_id: String,
    pub(crate) test_name: String,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) percentage: i32,
    pub(crate) status: ResultStatus,
    pub(crate) answered: usize,
    pub(crate) section_breakdown: Vec<SectionBreakdown>,
    pub(crate) completed_at: String,
    pub(crate) recalculated_at: Option<String>,
    pub(crate) persisted: bool,
}

impl ResultResponse {
    pub(crate) fn from_db(result: ExamResult, persisted: bool) -> Self {
        Self {
            percentage: scoring::percentage(result.score, result.max_score),
            answered: result.user_answers.len(),
            id: result.id,
            user_id: result.user_id,
            user_name: result.user_name,
            test_id: result.test_id,
            test_name: result.test_name,
            score: result.score,
            max_score: result.max_score,
            status: result.status,
            section_breakdown: result.section_breakdown,
            completed_at: format_primitive(result.completed_at),
            recalculated_at: result.recalculated_at.map(format_primitive),
            persisted,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultDetailResponse {
    #[serde(flatten)]
    pub(crate) result: ResultResponse,
    pub(crate) next_view: View,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewItem {
    pub(crate) section: String,
    pub(crate) position: usize,
    pub(crate) question_id: String,
    /// False when the question has since been deleted from the bank.
    pub(crate) available: bool,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    pub(crate) selected: Option<u8>,
    pub(crate) correct_index: Option<u8>,
    pub(crate) is_correct: bool,
    pub(crate) explanation: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewResponse {
    pub(crate) result: ResultResponse,
    pub(crate) items: Vec<ReviewItem>,
    pub(crate) option_count: usize,
    pub(crate) next_view: View,
}

impl ReviewResponse {
    pub(crate) fn new(result: ResultResponse, items: Vec<ReviewItem>, next_view: View) -> Self {
        Self { result, items, option_count: OPTION_COUNT, next_view }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RecalculateResponse {
    pub(crate) result_id: String,
    pub(crate) stored_score: i32,
    pub(crate) recalculated_score: i32,
    pub(crate) max_score: i32,
    pub(crate) stored_percentage: i32,
    pub(crate) recalculated_percentage: i32,
    pub(crate) drift: i32,
    pub(crate) sections: Vec<SectionBreakdown>,
    pub(crate) recalculated_at: String,
}
