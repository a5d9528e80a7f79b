use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::core::time::format_primitive;
use crate::db::types::{SessionStatus, UserRole};
use crate::repositories;
use crate::schemas::result::ResultResponse;
use crate::schemas::session::{SessionQuestionResponse, SessionResponse, SessionSectionResponse};
use crate::services::attempt_finalize::{session_status, AttemptSnapshot};
use crate::services::exam_engine::Phase;
use crate::services::portal::{self, Action, View};

/// The result to show alongside a session: the one recorded by this step, or the stored one.
async fn session_result(
    state: &AppState,
    snapshot: &AttemptSnapshot,
) -> Result<Option<ResultResponse>, ApiError> {
    if let Some(recorded) = &snapshot.recorded {
        return Ok(Some(ResultResponse::from_db(recorded.result.clone(), recorded.persisted)));
    }
    let Some(result_id) = snapshot.session.result_id.as_deref() else {
        return Ok(None);
    };

    let result = repositories::exam_results::find_by_id(state.db(), result_id)
        .await
        .map_err(|e| ApiError::store(e, "Failed to load exam result"))?;
    Ok(result.map(|result| ResultResponse::from_db(result, true)))
}

pub(crate) async fn render_session(
    state: &AppState,
    snapshot: AttemptSnapshot,
    role: UserRole,
) -> Result<SessionResponse, ApiError> {
    let result = session_result(state, &snapshot).await?;
    let AttemptSnapshot { session, test, engine, questions, deadline_passed, now, .. } = snapshot;

    let total_questions = engine.question_count();
    let answers = engine.answers();
    let active_section = match engine.phase() {
        Phase::Testing { section, .. } => Some(section),
        Phase::Lobby | Phase::Finished { .. } => None,
    };

    let sections = engine
        .sections()
        .iter()
        .enumerate()
        .map(|(index, section)| {
            let plan = &section.plan;
            let items = (active_section == Some(index)).then(|| {
                plan.question_ids
                    .iter()
                    .enumerate()
                    .map(|(position, question_id)| {
                        let question = questions.get(question_id);
                        SessionQuestionResponse {
                            position,
                            id: question_id.clone(),
                            available: question.is_some(),
                            text: question.map(|q| q.text.clone()).unwrap_or_default(),
                            options: question.map(|q| q.options.to_vec()).unwrap_or_default(),
                            selected: answers.get(question_id).copied(),
                        }
                    })
                    .collect()
            });

            SessionSectionResponse {
                index,
                id: plan.id.clone(),
                name: plan.name.clone(),
                marks_per_question: plan.marks_per_question,
                question_count: plan.question_ids.len(),
                answered: plan.question_ids.iter().filter(|id| answers.contains_key(*id)).count(),
                submitted: section.submitted,
                questions: items,
            }
        })
        .collect();

    let finished = engine.is_finished();
    let exam_view = View::Exam { test_id: session.test_id.clone(), session_id: session.id.clone() };
    let next_view = if finished {
        let result_id = result.as_ref().map(|result| result.id.clone());
        portal::dispatch(&exam_view, Some(role), Action::ExamFinished { result_id })
    } else {
        exam_view
    };

    let status = if session.status == SessionStatus::Active {
        session_status(&engine)
    } else {
        session.status
    };

    Ok(SessionResponse {
        id: session.id,
        test_id: session.test_id,
        test_name: test.name,
        status,
        phase: engine.phase(),
        duration_seconds: engine.duration_seconds(),
        remaining_seconds: if finished { 0 } else { engine.remaining_seconds(now) },
        timer_running: engine.started_at().is_some() && !finished,
        started_at: session.started_at.map(format_primitive),
        expires_at: session.expires_at.map(format_primitive),
        created_at: format_primitive(session.created_at),
        updated_at: format_primitive(session.updated_at),
        answered: answers.len(),
        total_questions,
        pending_sections: engine.pending_sections(),
        sections,
        deadline_passed,
        result,
        next_view,
    })
}
