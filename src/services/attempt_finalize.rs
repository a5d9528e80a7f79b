//! Applies one step to a stored exam session inside a row-locked transaction.
//!
//! Every mutation first lets the countdown catch up: when the deadline has
//! passed the attempt is auto-submitted and the requested step is skipped.
//! Recording the result runs under a savepoint so a failed insert still lets
//! the session close, and the caller gets a locally built result instead.

use std::collections::HashMap;

use sqlx::{Connection, PgConnection};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::{ExamResult, ExamSessionRow, MockTest, Question};
use crate::db::types::{ResultStatus, SessionStatus};
use crate::repositories::{self, StoreError};
use crate::services::change_feed::ChangeEvent;
use crate::services::exam_engine::{AttemptOutcome, EngineError, ExamEngine, Phase};
use crate::services::scoring::{self, AnswerKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizeMode {
    ManualSubmit,
    AutoDeadline,
}

impl FinalizeMode {
    fn label(self) -> &'static str {
        match self {
            FinalizeMode::ManualSubmit => "manual",
            FinalizeMode::AutoDeadline => "deadline",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("exam session not found")]
    NotFound,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for AttemptError {
    fn from(err: sqlx::Error) -> Self {
        AttemptError::Store(StoreError::Db(err))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedResult {
    pub(crate) result: ExamResult,
    /// False when the insert failed and `result` only exists in this response.
    pub(crate) persisted: bool,
}

/// Everything needed to render a session after a step.
#[derive(Debug)]
pub(crate) struct AttemptSnapshot {
    pub(crate) session: ExamSessionRow,
    pub(crate) test: MockTest,
    pub(crate) engine: ExamEngine,
    pub(crate) questions: HashMap<String, Question>,
    pub(crate) recorded: Option<RecordedResult>,
    pub(crate) deadline_passed: bool,
    pub(crate) now: OffsetDateTime,
}

/// A step that only lets the countdown catch up.
pub(crate) fn no_op(
    _: &mut ExamEngine,
    _: OffsetDateTime,
    _: &AnswerKey,
) -> Result<Option<AttemptOutcome>, EngineError> {
    Ok(None)
}

/// Loads the answer key and question bodies for the paper the attempt started with.
///
/// Edits to the test after the start never reach a running attempt.
pub(crate) async fn load_questions(
    conn: &mut PgConnection,
    engine: &ExamEngine,
) -> Result<(HashMap<String, Question>, AnswerKey), StoreError> {
    let mut ids: Vec<String> = engine
        .sections()
        .iter()
        .flat_map(|section| section.plan.question_ids.iter().cloned())
        .collect();
    ids.sort();
    ids.dedup();

    let questions = repositories::questions::find_many(&mut *conn, &ids).await?;
    let key = scoring::answer_key(&questions);
    let questions = questions.into_iter().map(|question| (question.id.clone(), question)).collect();
    Ok((questions, key))
}

/// Locks the session, catches the countdown up, applies `step` and commits.
///
/// `owner` restricts the session to one user; sessions of other users look missing.
pub(crate) async fn advance<F>(
    state: &AppState,
    session_id: &str,
    owner: Option<&str>,
    step: F,
) -> Result<AttemptSnapshot, AttemptError>
where
    F: FnOnce(&mut ExamEngine, OffsetDateTime, &AnswerKey) -> Result<Option<AttemptOutcome>, EngineError>
        + Send,
{
    let mut tx = state.db().begin().await?;

    let session = repositories::exam_sessions::lock_by_id(&mut *tx, session_id)
        .await?
        .ok_or(AttemptError::NotFound)?;
    if owner.is_some_and(|owner| owner != session.user_id) {
        return Err(AttemptError::NotFound);
    }

    let mut engine =
        repositories::exam_sessions::decode_engine(&session).map_err(StoreError::from)?;
    let test = repositories::mock_tests::find_by_id(&mut *tx, &session.test_id)
        .await?
        .ok_or(AttemptError::NotFound)?;
    let (questions, key) = load_questions(&mut tx, &engine).await?;

    let now = OffsetDateTime::now_utc();
    let before = engine.clone();

    let (outcome, mode, deadline_passed) = match engine.tick(now, &key) {
        Some(outcome) => (Some(outcome), FinalizeMode::AutoDeadline, true),
        None => (step(&mut engine, now, &key)?, FinalizeMode::ManualSubmit, false),
    };

    if engine == before {
        tx.commit().await?;
        return Ok(AttemptSnapshot {
            session,
            test,
            engine,
            questions,
            recorded: None,
            deadline_passed,
            now,
        });
    }

    let recorded = match &outcome {
        Some(outcome) => Some(record_outcome(&mut tx, &session, &test, outcome, mode).await),
        None => None,
    };
    let result_id = recorded
        .as_ref()
        .filter(|recorded| recorded.persisted)
        .map(|recorded| recorded.result.id.as_str());
    let session = save_engine(&mut tx, &session.id, &engine, result_id).await?;
    tx.commit().await?;

    if recorded.as_ref().is_some_and(|recorded| recorded.persisted) {
        state.feed().publish(ChangeEvent::ResultRecorded { user_id: session.user_id.clone() });
    }
    if let Phase::Finished { status } = engine.phase() {
        tracing::info!(
            session_id = %session.id,
            test_id = %session.test_id,
            user_id = %session.user_id,
            status = status.as_str(),
            "Exam session closed"
        );
    }

    Ok(AttemptSnapshot { session, test, engine, questions, recorded, deadline_passed, now })
}

async fn record_outcome(
    conn: &mut PgConnection,
    session: &ExamSessionRow,
    test: &MockTest,
    outcome: &AttemptOutcome,
    mode: FinalizeMode,
) -> RecordedResult {
    let user_name = match repositories::users::find_by_id(&mut *conn, &session.user_id).await {
        Ok(Some(user)) => user.display_name,
        Ok(None) => "Unknown".to_string(),
        Err(err) => {
            tracing::warn!(error = %err, user_id = %session.user_id, "Failed to load result owner");
            "Unknown".to_string()
        }
    };
    let completed_at = primitive_now_utc();
    let id = Uuid::new_v4().to_string();

    let inserted = async {
        let mut savepoint = conn.begin().await?;
        let result = repositories::exam_results::create(
            &mut *savepoint,
            repositories::exam_results::CreateResult {
                id: &id,
                user_id: &session.user_id,
                user_name: &user_name,
                test_id: &test.id,
                test_name: &test.name,
                outcome,
                completed_at,
            },
        )
        .await?;
        savepoint.commit().await?;
        Ok::<_, StoreError>(result)
    }
    .await;

    match inserted {
        Ok(result) => {
            metrics::counter!(
                "exam_results_recorded_total",
                "status" => outcome.status.as_str(),
                "mode" => mode.label()
            )
            .increment(1);
            RecordedResult { result, persisted: true }
        }
        Err(err) => {
            metrics::counter!("exam_result_persist_failures_total").increment(1);
            tracing::error!(
                error = %err,
                session_id = %session.id,
                test_id = %test.id,
                "Failed to persist exam result; returning local copy"
            );
            RecordedResult {
                result: local_result(session, test, &user_name, outcome, completed_at),
                persisted: false,
            }
        }
    }
}

pub(crate) fn local_result(
    session: &ExamSessionRow,
    test: &MockTest,
    user_name: &str,
    outcome: &AttemptOutcome,
    completed_at: time::PrimitiveDateTime,
) -> ExamResult {
    ExamResult {
        id: format!("local-{}", Uuid::new_v4()),
        user_id: session.user_id.clone(),
        user_name: user_name.to_string(),
        test_id: test.id.clone(),
        test_name: test.name.clone(),
        score: outcome.sheet.score,
        max_score: outcome.sheet.max_score,
        status: outcome.status,
        user_answers: outcome.answers.clone(),
        section_breakdown: outcome.sheet.sections.clone(),
        completed_at,
        recalculated_at: None,
    }
}

pub(crate) fn session_status(engine: &ExamEngine) -> SessionStatus {
    match engine.phase() {
        Phase::Finished { status: ResultStatus::Abandoned } => SessionStatus::Abandoned,
        Phase::Finished { .. } => SessionStatus::Finished,
        Phase::Lobby | Phase::Testing { .. } => SessionStatus::Active,
    }
}

pub(crate) async fn save_engine(
    conn: &mut PgConnection,
    session_id: &str,
    engine: &ExamEngine,
    result_id: Option<&str>,
) -> Result<ExamSessionRow, sqlx::Error> {
    repositories::exam_sessions::save(
        conn,
        session_id,
        repositories::exam_sessions::SaveSession {
            engine,
            status: session_status(engine),
            started_at: engine.started_at().map(to_primitive_utc),
            expires_at: engine.expires_at().map(to_primitive_utc),
            result_id,
            now: primitive_now_utc(),
        },
    )
    .await
}
