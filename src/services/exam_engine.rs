//! Timed, sectioned exam attempt as a pure state machine.
//!
//! One countdown covers the whole test and starts on the first section entry.
//! Sections are entered from the lobby, answered, then submitted one-way. The
//! attempt ends with a final submission once every section is locked, or with
//! a forced auto-submission when the countdown reaches zero.
//!
//! The engine is serialized verbatim into `exam_sessions.state`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::db::models::{MockTest, TestSection, OPTION_COUNT};
use crate::db::types::ResultStatus;
use crate::services::scoring::{self, AnswerKey, ScoreSheet};

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum EngineError {
    #[error("the attempt has already finished")]
    Finished,
    #[error("a section is already in progress")]
    SectionInProgress,
    #[error("no section is in progress")]
    NoActiveSection,
    #[error("section {0} does not exist")]
    SectionOutOfRange(usize),
    #[error("question {0} does not exist in this section")]
    QuestionOutOfRange(usize),
    #[error("option {0} is not one of the four choices")]
    InvalidOption(u8),
    #[error("{pending} section(s) must be submitted before the final submission")]
    SectionsPending { pending: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Phase {
    Lobby,
    Testing { section: usize, question: usize },
    Finished { status: ResultStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SectionEntry {
    Entered,
    AlreadySubmitted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EngineSection {
    #[serde(flatten)]
    pub(crate) plan: TestSection,
    pub(crate) submitted: bool,
}

/// The scored end of an attempt, ready to be persisted as an `ExamResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AttemptOutcome {
    pub(crate) status: ResultStatus,
    pub(crate) sheet: ScoreSheet,
    pub(crate) answers: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExamEngine {
    sections: Vec<EngineSection>,
    duration_seconds: i64,
    phase: Phase,
    answers: BTreeMap<String, u8>,
    started_at: Option<i64>,
}

impl ExamEngine {
    pub(crate) fn new(test: &MockTest) -> Self {
        Self {
            sections: test
                .sections
                .iter()
                .cloned()
                .map(|plan| EngineSection { plan, submitted: false })
                .collect(),
            duration_seconds: i64::from(test.duration_seconds),
            phase: Phase::Lobby,
            answers: BTreeMap::new(),
            started_at: None,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn sections(&self) -> &[EngineSection] {
        &self.sections
    }

    pub(crate) fn answers(&self) -> &BTreeMap<String, u8> {
        &self.answers
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished { .. })
    }

    pub(crate) fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at.and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    }

    pub(crate) fn expires_at(&self) -> Option<OffsetDateTime> {
        self.started_at
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts + self.duration_seconds).ok())
    }

    /// Full duration while the timer is dormant, never negative once running.
    pub(crate) fn remaining_seconds(&self, now: OffsetDateTime) -> i64 {
        match self.started_at {
            None => self.duration_seconds,
            Some(started) => {
                let elapsed = now.unix_timestamp() - started;
                (self.duration_seconds - elapsed).clamp(0, self.duration_seconds)
            }
        }
    }

    pub(crate) fn enter_section(
        &mut self,
        index: usize,
        now: OffsetDateTime,
    ) -> Result<SectionEntry, EngineError> {
        match self.phase {
            Phase::Finished { .. } => return Err(EngineError::Finished),
            Phase::Testing { .. } => return Err(EngineError::SectionInProgress),
            Phase::Lobby => {}
        }
        let section = self.sections.get(index).ok_or(EngineError::SectionOutOfRange(index))?;
        if section.submitted {
            return Ok(SectionEntry::AlreadySubmitted);
        }

        if self.started_at.is_none() {
            self.started_at = Some(now.unix_timestamp());
        }
        self.phase = Phase::Testing { section: index, question: 0 };
        Ok(SectionEntry::Entered)
    }

    pub(crate) fn navigate(&mut self, question: usize) -> Result<(), EngineError> {
        let (section, _) = self.active_section()?;
        if question >= self.sections[section].plan.question_ids.len() {
            return Err(EngineError::QuestionOutOfRange(question));
        }
        self.phase = Phase::Testing { section, question };
        Ok(())
    }

    /// Records the choice for a question of the active section, replacing any earlier one.
    pub(crate) fn select_option(&mut self, question: usize, option: u8) -> Result<(), EngineError> {
        let (section, _) = self.active_section()?;
        if usize::from(option) >= OPTION_COUNT {
            return Err(EngineError::InvalidOption(option));
        }
        let question_id = self.sections[section]
            .plan
            .question_ids
            .get(question)
            .ok_or(EngineError::QuestionOutOfRange(question))?
            .clone();

        self.answers.insert(question_id, option);
        self.phase = Phase::Testing { section, question };
        Ok(())
    }

    pub(crate) fn submit_section(&mut self) -> Result<usize, EngineError> {
        let (section, _) = self.active_section()?;
        self.sections[section].submitted = true;
        self.phase = Phase::Lobby;
        Ok(section)
    }

    pub(crate) fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    pub(crate) fn question_count(&self) -> usize {
        self.sections.iter().map(|section| section.plan.question_ids.len()).sum()
    }

    pub(crate) fn pending_sections(&self) -> usize {
        self.sections.iter().filter(|section| !section.submitted).count()
    }

    /// Final submission. Leaves the engine untouched unless every section is submitted.
    pub(crate) fn finalize(&mut self, key: &AnswerKey) -> Result<AttemptOutcome, EngineError> {
        match self.phase {
            Phase::Finished { .. } => return Err(EngineError::Finished),
            Phase::Testing { .. } => return Err(EngineError::SectionInProgress),
            Phase::Lobby => {}
        }
        let pending = self.pending_sections();
        if pending > 0 {
            return Err(EngineError::SectionsPending { pending });
        }
        Ok(self.close(ResultStatus::Completed, key))
    }

    /// Forces scoring once the countdown has run out.
    pub(crate) fn tick(&mut self, now: OffsetDateTime, key: &AnswerKey) -> Option<AttemptOutcome> {
        if self.is_finished() || self.started_at.is_none() || self.remaining_seconds(now) > 0 {
            return None;
        }
        Some(self.close(ResultStatus::AutoSubmitted, key))
    }

    /// Discards the attempt. No outcome is produced.
    pub(crate) fn abandon(&mut self) -> Result<(), EngineError> {
        if self.is_finished() {
            return Err(EngineError::Finished);
        }
        self.phase = Phase::Finished { status: ResultStatus::Abandoned };
        Ok(())
    }

    fn active_section(&self) -> Result<(usize, usize), EngineError> {
        match self.phase {
            Phase::Testing { section, question } => Ok((section, question)),
            Phase::Finished { .. } => Err(EngineError::Finished),
            Phase::Lobby => Err(EngineError::NoActiveSection),
        }
    }

    fn close(&mut self, status: ResultStatus, key: &AnswerKey) -> AttemptOutcome {
        let plans: Vec<TestSection> =
            self.sections.iter().map(|section| section.plan.clone()).collect();
        let sheet = scoring::score_attempt(&plans, key, &self.answers);
        self.phase = Phase::Finished { status };
        AttemptOutcome { status, sheet, answers: self.answers.clone() }
    }
}
