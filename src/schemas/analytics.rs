use serde::{Deserialize, Serialize};

use crate::core::time::{format_date, format_offset, format_primitive};
use crate::db::types::ResultStatus;
use crate::services::analytics::{
    AnalyticsFilter, AnalyticsReport, Kpis, QuestionStats, RecencyWindow, TestRollup, TrendPoint,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AnalyticsQuery {
    #[serde(default)]
    pub(crate) window: RecencyWindow,
    #[serde(default)]
    pub(crate) status: Option<ResultStatus>,
    #[serde(default, alias = "testId")]
    pub(crate) test_id: Option<String>,
    #[serde(default, alias = "userId")]
    pub(crate) user_id: Option<String>,
    #[serde(default)]
    pub(crate) subject: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

impl From<AnalyticsQuery> for AnalyticsFilter {
    fn from(query: AnalyticsQuery) -> Self {
        Self {
            window: query.window,
            status: query.status,
            test_id: non_empty(query.test_id),
            user_id: non_empty(query.user_id),
            subject: non_empty(query.subject),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TrendPointResponse {
    pub(crate) day: String,
    pub(crate) attempts: usize,
    pub(crate) mean_score_pct: f64,
}

impl From<TrendPoint> for TrendPointResponse {
    fn from(point: TrendPoint) -> Self {
        Self {
            day: format_date(point.day),
            attempts: point.attempts,
            mean_score_pct: point.mean_score_pct,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TestRollupResponse {
    pub(crate) test_id: String,
    pub(crate) test_name: String,
    pub(crate) attempts: usize,
    pub(crate) unique_candidates: usize,
    pub(crate) mean_score_pct: f64,
    pub(crate) pass_rate: f64,
    pub(crate) retake_rate: f64,
    pub(crate) last_activity: String,
}

impl From<TestRollup> for TestRollupResponse {
    fn from(rollup: TestRollup) -> Self {
        Self {
            test_id: rollup.test_id,
            test_name: rollup.test_name,
            attempts: rollup.attempts,
            unique_candidates: rollup.unique_candidates,
            mean_score_pct: rollup.mean_score_pct,
            pass_rate: rollup.pass_rate,
            retake_rate: rollup.retake_rate,
            last_activity: format_primitive(rollup.last_activity),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyticsResponse {
    pub(crate) generated_at: String,
    pub(crate) window: RecencyWindow,
    pub(crate) kpis: Kpis,
    pub(crate) trend: Vec<TrendPointResponse>,
    pub(crate) tests: Vec<TestRollupResponse>,
    pub(crate) hardest_questions: Vec<QuestionStats>,
    pub(crate) most_skipped_questions: Vec<QuestionStats>,
}

impl AnalyticsResponse {
    pub(crate) fn new(
        report: AnalyticsReport,
        window: RecencyWindow,
        generated_at: time::OffsetDateTime,
    ) -> Self {
        Self {
            generated_at: format_offset(generated_at),
            window,
            kpis: report.kpis,
            trend: report.trend.into_iter().map(Into::into).collect(),
            tests: report.tests.into_iter().map(Into::into).collect(),
            hardest_questions: report.hardest_questions,
            most_skipped_questions: report.most_skipped_questions,
        }
    }
}
