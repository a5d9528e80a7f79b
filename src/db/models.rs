use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ResultStatus, SessionStatus, UserRole};

pub(crate) const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) hashed_password: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Raw `questions` row. JSON payloads are decoded into [`Question`] by `db::decode`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct QuestionRow {
    pub(crate) id: String,
    pub(crate) subject: String,
    pub(crate) topic: String,
    pub(crate) text: String,
    pub(crate) options: Json<serde_json::Value>,
    pub(crate) correct_index: i16,
    pub(crate) explanation: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) subject: String,
    pub(crate) topic: String,
    pub(crate) text: String,
    pub(crate) options: [String; OPTION_COUNT],
    pub(crate) correct_index: u8,
    pub(crate) explanation: Option<String>,
    pub(crate) created_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TestSection {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) question_ids: Vec<String>,
    pub(crate) marks_per_question: i32,
}

impl TestSection {
    pub(crate) fn total_marks(&self) -> i32 {
        self.question_ids.len() as i32 * self.marks_per_question
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct MockTestRow {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) sections: Json<serde_json::Value>,
    pub(crate) duration_seconds: i32,
    pub(crate) allow_retake: bool,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) is_approved: bool,
    pub(crate) is_paused: bool,
    pub(crate) created_by: String,
    pub(crate) created_by_name: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MockTest {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) sections: Vec<TestSection>,
    pub(crate) duration_seconds: i32,
    pub(crate) allow_retake: bool,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) is_approved: bool,
    pub(crate) is_paused: bool,
    pub(crate) created_by: String,
    pub(crate) created_by_name: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl MockTest {
    pub(crate) fn question_ids(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().flat_map(|section| section.question_ids.iter().map(String::as_str))
    }

    pub(crate) fn question_count(&self) -> usize {
        self.sections.iter().map(|section| section.question_ids.len()).sum()
    }

    pub(crate) fn max_score(&self) -> i32 {
        self.sections.iter().map(TestSection::total_marks).sum()
    }

    /// Students only see approved tests that are not paused.
    pub(crate) fn is_open_to_students(&self) -> bool {
        self.is_approved && !self.is_paused
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamSessionRow {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) user_id: String,
    pub(crate) state: Json<serde_json::Value>,
    pub(crate) status: SessionStatus,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) expires_at: Option<PrimitiveDateTime>,
    pub(crate) result_id: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SectionBreakdown {
    pub(crate) name: String,
    pub(crate) score: i32,
    pub(crate) total: i32,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ExamResultRow {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) user_name: String,
    pub(crate) test_id: String,
    pub(crate) test_name: String,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) status: ResultStatus,
    pub(crate) user_answers: Json<serde_json::Value>,
    pub(crate) section_breakdown: Json<serde_json::Value>,
    pub(crate) completed_at: PrimitiveDateTime,
    pub(crate) recalculated_at: Option<PrimitiveDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExamResult {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) user_name: String,
    pub(crate) test_id: String,
    pub(crate) test_name: String,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) status: ResultStatus,
    pub(crate) user_answers: BTreeMap<String, u8>,
    pub(crate) section_breakdown: Vec<SectionBreakdown>,
    pub(crate) completed_at: PrimitiveDateTime,
    pub(crate) recalculated_at: Option<PrimitiveDateTime>,
}
