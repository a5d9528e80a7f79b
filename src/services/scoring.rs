use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::db::models::{Question, SectionBreakdown, TestSection};

/// Question id to correct option index.
pub(crate) type AnswerKey = HashMap<String, u8>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ScoreSheet {
    pub(crate) score: i32,
    pub(crate) max_score: i32,
    pub(crate) sections: Vec<SectionBreakdown>,
}

impl ScoreSheet {
    pub(crate) fn percentage(&self) -> i32 {
        percentage(self.score, self.max_score)
    }
}

pub(crate) fn answer_key<'a>(questions: impl IntoIterator<Item = &'a Question>) -> AnswerKey {
    questions.into_iter().map(|question| (question.id.clone(), question.correct_index)).collect()
}

/// Scores an attempt section by section.
///
/// Every question counts toward the section total whether or not it was
/// answered; questions missing from the key can never score.
pub(crate) fn score_attempt(
    sections: &[TestSection],
    key: &AnswerKey,
    answers: &BTreeMap<String, u8>,
) -> ScoreSheet {
    let mut breakdown = Vec::with_capacity(sections.len());
    let mut score = 0;
    let mut max_score = 0;

    for section in sections {
        let correct = section
            .question_ids
            .iter()
            .filter(|question_id| is_correct(key, answers, question_id))
            .count() as i32;
        let section_score = correct * section.marks_per_question;
        let section_total = section.total_marks();

        score += section_score;
        max_score += section_total;
        breakdown.push(SectionBreakdown {
            name: section.name.clone(),
            score: section_score,
            total: section_total,
        });
    }

    ScoreSheet { score, max_score, sections: breakdown }
}

pub(crate) fn is_correct(key: &AnswerKey, answers: &BTreeMap<String, u8>, question_id: &str) -> bool {
    match (answers.get(question_id), key.get(question_id)) {
        (Some(chosen), Some(correct)) => chosen == correct,
        _ => false,
    }
}

/// `round(100 * score / max_score)`, or 0 when there is nothing to score.
pub(crate) fn percentage(score: i32, max_score: i32) -> i32 {
    if max_score <= 0 {
        return 0;
    }
    (100.0 * f64::from(score) / f64::from(max_score)).round() as i32
}
