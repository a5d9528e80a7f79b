use serde::{Deserialize, Serialize};

use crate::db::types::SessionStatus;
use crate::schemas::result::ResultResponse;
use crate::services::exam_engine::Phase;
use crate::services::portal::View;

#[derive(Debug, Deserialize)]
pub(crate) struct NavigateRequest {
    pub(crate) question: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnswerRequest {
    pub(crate) question: usize,
    pub(crate) option: u8,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AbandonRequest {
    #[serde(default)]
    pub(crate) confirm: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionQuestionResponse {
    pub(crate) position: usize,
    pub(crate) id: String,
    pub(crate) available: bool,
    pub(crate) text: String,
    pub(crate) options: Vec<String>,
    pub(crate) selected: Option<u8>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionSectionResponse {
    pub(crate) index: usize,
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) marks_per_question: i32,
    pub(crate) question_count: usize,
    pub(crate) answered: usize,
    pub(crate) submitted: bool,
    /// Only the active section carries its questions. Never includes the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<Vec<SessionQuestionResponse>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SessionResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) test_name: String,
    pub(crate) status: SessionStatus,
    pub(crate) phase: Phase,
    pub(crate) duration_seconds: i64,
    pub(crate) remaining_seconds: i64,
    pub(crate) timer_running: bool,
    pub(crate) started_at: Option<String>,
    pub(crate) expires_at: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) answered: usize,
    pub(crate) total_questions: usize,
    pub(crate) pending_sections: usize,
    pub(crate) sections: Vec<SessionSectionResponse>,
    /// True when this request found the countdown already over and auto-submitted.
    pub(crate) deadline_passed: bool,
    pub(crate) result: Option<ResultResponse>,
    pub(crate) next_view: View,
}

#[derive(Debug, Serialize)]
pub(crate) struct StartSessionResponse {
    pub(crate) resumed: bool,
    #[serde(flatten)]
    pub(crate) session: SessionResponse,
}
