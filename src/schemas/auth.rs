use serde::Serialize;

use crate::schemas::user::UserResponse;
use crate::services::portal::View;

#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) token_type: String,
    pub(crate) user: UserResponse,
    pub(crate) next_view: View,
}

/// Session restore: who is signed in and where the client should land.
#[derive(Debug, Serialize)]
pub(crate) struct SessionRestoreResponse {
    pub(crate) authenticated: bool,
    pub(crate) user: Option<UserResponse>,
    pub(crate) view: View,
}
