//! Admin analytics derived from results, tests and the question bank.
//!
//! Everything here is a pure function of its inputs; callers reload the three
//! collections and recompute on every request.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};

use crate::db::models::{ExamResult, MockTest, Question, OPTION_COUNT};
use crate::db::types::ResultStatus;
use crate::services::scoring;

const PASS_THRESHOLD: i64 = 50;
const EXCELLENCE_THRESHOLD: i64 = 70;
const MIN_QUESTION_ATTEMPTS: u32 = 3;
const QUESTION_LIST_LIMIT: usize = 10;
const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) enum RecencyWindow {
    #[serde(rename = "7d")]
    Days7,
    #[default]
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "all")]
    AllTime,
}

impl RecencyWindow {
    fn cutoff(self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        let days = match self {
            RecencyWindow::Days7 => 7,
            RecencyWindow::Days30 => 30,
            RecencyWindow::Days90 => 90,
            RecencyWindow::AllTime => return None,
        };
        Some(now - Duration::days(days))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AnalyticsFilter {
    pub(crate) window: RecencyWindow,
    pub(crate) status: Option<ResultStatus>,
    pub(crate) test_id: Option<String>,
    pub(crate) user_id: Option<String>,
    pub(crate) subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Kpis {
    pub(crate) attempts: usize,
    pub(crate) unique_candidates: usize,
    pub(crate) mean_score_pct: f64,
    pub(crate) pass_rate: f64,
    pub(crate) excellence_rate: f64,
    pub(crate) auto_submit_rate: f64,
    pub(crate) abandonment_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrendPoint {
    pub(crate) day: Date,
    pub(crate) attempts: usize,
    pub(crate) mean_score_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TestRollup {
    pub(crate) test_id: String,
    pub(crate) test_name: String,
    pub(crate) attempts: usize,
    pub(crate) unique_candidates: usize,
    pub(crate) mean_score_pct: f64,
    pub(crate) pass_rate: f64,
    pub(crate) retake_rate: f64,
    pub(crate) last_activity: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct QuestionStats {
    pub(crate) question_id: String,
    pub(crate) subject: String,
    pub(crate) topic: String,
    pub(crate) text: String,
    pub(crate) attempts: u32,
    pub(crate) correct: u32,
    pub(crate) unattempted: u32,
    pub(crate) option_counts: [u32; OPTION_COUNT],
    pub(crate) correct_rate: f64,
    pub(crate) unattempted_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnalyticsReport {
    pub(crate) kpis: Kpis,
    pub(crate) trend: Vec<TrendPoint>,
    pub(crate) tests: Vec<TestRollup>,
    pub(crate) hardest_questions: Vec<QuestionStats>,
    pub(crate) most_skipped_questions: Vec<QuestionStats>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LeaderboardEntry {
    pub(crate) rank: usize,
    pub(crate) user_id: String,
    pub(crate) user_name: String,
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) percentage: i32,
    pub(crate) completed_at: PrimitiveDateTime,
}

pub(crate) fn build_report(
    results: &[ExamResult],
    tests: &[MockTest],
    questions: &[Question],
    filter: &AnalyticsFilter,
    now: OffsetDateTime,
) -> AnalyticsReport {
    let tests_by_id: HashMap<&str, &MockTest> =
        tests.iter().map(|test| (test.id.as_str(), test)).collect();
    let questions_by_id: HashMap<&str, &Question> =
        questions.iter().map(|question| (question.id.as_str(), question)).collect();

    let selected = filter_results(results, &tests_by_id, &questions_by_id, filter, now);
    let question_stats = question_rollup(&selected, &tests_by_id, &questions_by_id);

    AnalyticsReport {
        kpis: kpis(&selected),
        trend: daily_trend(&selected),
        tests: test_rollup(&selected),
        hardest_questions: hardest(&question_stats),
        most_skipped_questions: most_skipped(&question_stats),
    }
}

fn filter_results<'a>(
    results: &'a [ExamResult],
    tests: &HashMap<&str, &MockTest>,
    questions: &HashMap<&str, &Question>,
    filter: &AnalyticsFilter,
    now: OffsetDateTime,
) -> Vec<&'a ExamResult> {
    let cutoff = filter.window.cutoff(now);
    let subject = filter.subject.as_deref().map(str::trim).filter(|value| !value.is_empty());

    results
        .iter()
        .filter(|result| cutoff.map_or(true, |cutoff| result.completed_at.assume_utc() >= cutoff))
        .filter(|result| filter.status.map_or(true, |status| result.status == status))
        .filter(|result| filter.test_id.as_deref().map_or(true, |id| result.test_id == id))
        .filter(|result| filter.user_id.as_deref().map_or(true, |id| result.user_id == id))
        .filter(|result| {
            subject.map_or(true, |subject| test_covers_subject(result, tests, questions, subject))
        })
        .collect()
}

fn test_covers_subject(
    result: &ExamResult,
    tests: &HashMap<&str, &MockTest>,
    questions: &HashMap<&str, &Question>,
    subject: &str,
) -> bool {
    let Some(test) = tests.get(result.test_id.as_str()) else {
        return false;
    };
    test.question_ids().any(|id| {
        questions.get(id).is_some_and(|question| question.subject.eq_ignore_ascii_case(subject))
    })
}

fn ratio_pct(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round1(100.0 * numerator as f64 / denominator as f64)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn exact_pct(result: &ExamResult) -> f64 {
    if result.max_score <= 0 {
        return 0.0;
    }
    100.0 * f64::from(result.score) / f64::from(result.max_score)
}

fn reaches(result: &ExamResult, threshold: i64) -> bool {
    result.max_score > 0 && i64::from(result.score) * 100 >= threshold * i64::from(result.max_score)
}

fn mean_pct(results: &[&ExamResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    round1(results.iter().map(|result| exact_pct(result)).sum::<f64>() / results.len() as f64)
}

fn count_where(results: &[&ExamResult], predicate: impl Fn(&ExamResult) -> bool) -> usize {
    results.iter().filter(|result| predicate(**result)).count()
}

pub(crate) fn kpis(results: &[&ExamResult]) -> Kpis {
    let attempts = results.len();
    let unique_candidates =
        results.iter().map(|result| result.user_id.as_str()).collect::<HashSet<_>>().len();

    Kpis {
        attempts,
        unique_candidates,
        mean_score_pct: mean_pct(results),
        pass_rate: ratio_pct(count_where(results, |r| reaches(r, PASS_THRESHOLD)), attempts),
        excellence_rate: ratio_pct(
            count_where(results, |r| reaches(r, EXCELLENCE_THRESHOLD)),
            attempts,
        ),
        auto_submit_rate: ratio_pct(
            count_where(results, |r| r.status == ResultStatus::AutoSubmitted),
            attempts,
        ),
        abandonment_rate: ratio_pct(
            count_where(results, |r| r.status == ResultStatus::Abandoned),
            attempts,
        ),
    }
}

/// Attempts and mean score per UTC calendar day, oldest first.
pub(crate) fn daily_trend(results: &[&ExamResult]) -> Vec<TrendPoint> {
    let mut days: BTreeMap<Date, Vec<&ExamResult>> = BTreeMap::new();
    for result in results.iter().copied() {
        days.entry(result.completed_at.date()).or_default().push(result);
    }

    days.into_iter()
        .map(|(day, items)| TrendPoint {
            day,
            attempts: items.len(),
            mean_score_pct: mean_pct(&items),
        })
        .collect()
}

pub(crate) fn test_rollup(results: &[&ExamResult]) -> Vec<TestRollup> {
    let mut by_test: HashMap<&str, Vec<&ExamResult>> = HashMap::new();
    for result in results.iter().copied() {
        by_test.entry(result.test_id.as_str()).or_default().push(result);
    }

    let mut rollups: Vec<TestRollup> = by_test
        .into_iter()
        .filter_map(|(test_id, items)| {
            let latest = items.iter().max_by_key(|result| result.completed_at)?;
            let mut per_candidate: HashMap<&str, usize> = HashMap::new();
            for result in &items {
                *per_candidate.entry(result.user_id.as_str()).or_default() += 1;
            }
            let retakers = per_candidate.values().filter(|count| **count > 1).count();

            Some(TestRollup {
                test_id: test_id.to_string(),
                test_name: latest.test_name.clone(),
                attempts: items.len(),
                unique_candidates: per_candidate.len(),
                mean_score_pct: mean_pct(&items),
                pass_rate: ratio_pct(count_where(&items, |r| reaches(r, PASS_THRESHOLD)), items.len()),
                retake_rate: ratio_pct(retakers, per_candidate.len()),
                last_activity: latest.completed_at,
            })
        })
        .collect();

    rollups.sort_by(|a, b| b.attempts.cmp(&a.attempts).then_with(|| a.test_name.cmp(&b.test_name)));
    rollups
}

/// Per-question usage traced through each attempt's test definition.
pub(crate) fn question_rollup(
    results: &[&ExamResult],
    tests: &HashMap<&str, &MockTest>,
    questions: &HashMap<&str, &Question>,
) -> Vec<QuestionStats> {
    let mut stats: BTreeMap<&str, QuestionStats> = BTreeMap::new();

    for result in results {
        let Some(test) = tests.get(result.test_id.as_str()) else {
            continue;
        };
        let mut seen = HashSet::new();
        for question_id in test.question_ids() {
            if !seen.insert(question_id) {
                continue;
            }
            let Some(question) = questions.get(question_id) else {
                continue;
            };
            let entry = stats.entry(question_id).or_insert_with(|| QuestionStats {
                question_id: question.id.clone(),
                subject: question.subject.clone(),
                topic: question.topic.clone(),
                text: question.text.clone(),
                attempts: 0,
                correct: 0,
                unattempted: 0,
                option_counts: [0; OPTION_COUNT],
                correct_rate: 0.0,
                unattempted_rate: 0.0,
            });

            entry.attempts += 1;
            match result.user_answers.get(question_id) {
                Some(choice) => {
                    if let Some(slot) = entry.option_counts.get_mut(usize::from(*choice)) {
                        *slot += 1;
                    }
                    if *choice == question.correct_index {
                        entry.correct += 1;
                    }
                }
                None => entry.unattempted += 1,
            }
        }
    }

    stats
        .into_values()
        .map(|mut entry| {
            entry.correct_rate = ratio_pct(entry.correct as usize, entry.attempts as usize);
            entry.unattempted_rate = ratio_pct(entry.unattempted as usize, entry.attempts as usize);
            entry
        })
        .collect()
}

fn eligible(stats: &[QuestionStats]) -> Vec<QuestionStats> {
    stats.iter().filter(|entry| entry.attempts >= MIN_QUESTION_ATTEMPTS).cloned().collect()
}

pub(crate) fn hardest(stats: &[QuestionStats]) -> Vec<QuestionStats> {
    let mut items = eligible(stats);
    items.sort_by(|a, b| a.correct_rate.total_cmp(&b.correct_rate));
    items.truncate(QUESTION_LIST_LIMIT);
    items
}

pub(crate) fn most_skipped(stats: &[QuestionStats]) -> Vec<QuestionStats> {
    let mut items = eligible(stats);
    items.sort_by(|a, b| b.unattempted_rate.total_cmp(&a.unattempted_rate));
    items.truncate(QUESTION_LIST_LIMIT);
    items
}

/// Ranks each candidate's first attempt on a test by raw score.
///
/// Later attempts never count. Equal scores keep chronological order.
pub(crate) fn leaderboard(results: &[ExamResult]) -> Vec<LeaderboardEntry> {
    let mut chronological: Vec<&ExamResult> = results.iter().collect();
    chronological.sort_by_key(|result| result.completed_at);

    let mut seen = HashSet::new();
    let mut firsts: Vec<&ExamResult> = chronological
        .into_iter()
        .filter(|result| seen.insert(result.user_id.as_str()))
        .collect();
    firsts.sort_by(|a, b| b.score.cmp(&a.score));

    firsts
        .into_iter()
        .take(LEADERBOARD_SIZE)
        .enumerate()
        .map(|(index, result)| LeaderboardEntry {
            rank: index + 1,
            user_id: result.user_id.clone(),
            user_name: result.user_name.clone(),
            score: result.score,
            max_score: result.max_score,
            percentage: scoring::percentage(result.score, result.max_score),
            completed_at: result.completed_at,
        })
        .collect()
}
