use thiserror::Error;

use crate::db::models::MockTest;
use crate::db::types::UserRole;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum StartDenied {
    #[error("this test is not available")]
    NotOpen,
    #[error("this test has no questions")]
    Empty,
    #[error("retakes are not allowed for this test")]
    RetakeDisallowed,
    #[error("attempt limit of {max} reached")]
    AttemptLimitReached { max: i32 },
}

/// Decides whether `role` may begin a new attempt after `prior_attempts` recorded results.
///
/// Staff start any test as a preview and are not bound by retake rules.
pub(crate) fn check_start(
    test: &MockTest,
    role: UserRole,
    prior_attempts: i64,
) -> Result<(), StartDenied> {
    if test.question_count() == 0 {
        return Err(StartDenied::Empty);
    }
    if role.is_staff() {
        return Ok(());
    }
    if !test.is_open_to_students() {
        return Err(StartDenied::NotOpen);
    }
    if prior_attempts > 0 && !test.allow_retake {
        return Err(StartDenied::RetakeDisallowed);
    }
    if let Some(max) = test.max_attempts {
        if prior_attempts >= i64::from(max) {
            return Err(StartDenied::AttemptLimitReached { max });
        }
    }
    Ok(())
}
