//! Which screen a principal should be looking at.
//!
//! Every navigation decision goes through [`dispatch`], so the server can tell
//! clients where to land after sign-in, session restore or an exam transition.

use serde::Serialize;

use crate::db::types::UserRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub(crate) enum View {
    Auth,
    Dashboard,
    Admin,
    Exam { test_id: String, session_id: String },
    Results { result_id: String },
    Review { result_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    SignedIn,
    StartExam { test_id: String, session_id: String },
    /// `None` when the attempt was abandoned and nothing was recorded.
    ExamFinished { result_id: Option<String> },
    OpenResults { result_id: String },
    OpenReview { result_id: String },
}

pub(crate) fn home(role: UserRole) -> View {
    if role.is_staff() {
        View::Admin
    } else {
        View::Dashboard
    }
}

pub(crate) fn dispatch(current: &View, role: Option<UserRole>, action: Action) -> View {
    let Some(role) = role else {
        return View::Auth;
    };
    let in_exam = matches!(current, View::Exam { .. });

    match action {
        Action::SignedIn => home(role),
        // An exam in progress can only be left by finishing it.
        Action::OpenResults { .. } | Action::OpenReview { .. } | Action::StartExam { .. }
            if in_exam =>
        {
            current.clone()
        }
        Action::StartExam { test_id, session_id } => View::Exam { test_id, session_id },
        Action::ExamFinished { result_id: Some(result_id) } => View::Results { result_id },
        Action::ExamFinished { result_id: None } => home(role),
        Action::OpenResults { result_id } => View::Results { result_id },
        Action::OpenReview { result_id } => View::Review { result_id },
    }
}

/// Landing view on session restore: resume a running exam, otherwise go home.
pub(crate) fn landing(role: Option<UserRole>, active_exam: Option<(String, String)>) -> View {
    let signed_in = dispatch(&View::Auth, role, Action::SignedIn);
    match active_exam {
        Some((test_id, session_id)) => {
            dispatch(&signed_in, role, Action::StartExam { test_id, session_id })
        }
        None => signed_in,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exam() -> View {
        View::Exam { test_id: "t1".into(), session_id: "s1".into() }
    }

    #[test]
    fn landing_depends_on_role() {
        assert_eq!(landing(None, None), View::Auth);
        assert_eq!(landing(Some(UserRole::Student), None), View::Dashboard);
        assert_eq!(landing(Some(UserRole::Admin), None), View::Admin);
        assert_eq!(landing(Some(UserRole::RootAdmin), None), View::Admin);
    }

    #[test]
    fn restore_resumes_running_exam() {
        let view = landing(Some(UserRole::Student), Some(("t1".into(), "s1".into())));
        assert_eq!(view, exam());
        assert_eq!(landing(None, Some(("t1".into(), "s1".into()))), View::Auth);
    }

    #[test]
    fn exam_is_left_only_by_finishing() {
        let role = Some(UserRole::Student);
        assert_eq!(
            dispatch(&exam(), role, Action::OpenResults { result_id: "r0".into() }),
            exam()
        );
        assert_eq!(
            dispatch(&exam(), role, Action::OpenReview { result_id: "r1".into() }),
            exam()
        );
        assert_eq!(
            dispatch(&exam(), role, Action::ExamFinished { result_id: Some("r1".into()) }),
            View::Results { result_id: "r1".into() }
        );
        assert_eq!(
            dispatch(&exam(), role, Action::ExamFinished { result_id: None }),
            View::Dashboard
        );
    }

    #[test]
    fn results_flow_to_review_and_back() {
        let role = Some(UserRole::Student);
        let results = View::Results { result_id: "r1".into() };
        let review = dispatch(&results, role, Action::OpenReview { result_id: "r1".into() });
        assert_eq!(review, View::Review { result_id: "r1".into() });
        assert_eq!(
            dispatch(&review, role, Action::OpenResults { result_id: "r1".into() }),
            results
        );
        assert_eq!(dispatch(&review, None, Action::SignedIn), View::Auth);
    }

    #[test]
    fn view_serializes_with_tag() {
        let value = serde_json::to_value(exam()).unwrap();
        assert_eq!(value, serde_json::json!({"view": "exam", "test_id": "t1", "session_id": "s1"}));
    }
}
