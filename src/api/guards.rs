use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;

pub(crate) struct CurrentUser(pub(crate) User);
/// Admin or root admin.
pub(crate) struct CurrentStaff(pub(crate) User);
pub(crate) struct CurrentRootAdmin(pub(crate) User);

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Resolves a bearer token to an active user.
pub(crate) async fn authenticate(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = security::verify_token(token, state.settings())
        .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

    let user = repositories::users::find_by_id(state.db(), &claims.sub)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("User not found"))?;

    if !user.is_active {
        return Err(ApiError::Unauthorized("Invalid authentication credentials"));
    }
    Ok(user)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let token =
            bearer_token(parts).ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        authenticate(&app_state, token).await.map(CurrentUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role.is_staff() {
            Ok(CurrentStaff(user))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentRootAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::RootAdmin {
            Ok(CurrentRootAdmin(user))
        } else {
            Err(ApiError::Forbidden("Root admin access required"))
        }
    }
}

/// Like [`CurrentUser`] but never rejects: a missing or invalid token yields `None`.
pub(crate) struct MaybeUser(pub(crate) Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeUser(None));
        };

        match authenticate(state, token).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(ApiError::Unauthorized(_)) => Ok(MaybeUser(None)),
            Err(err) => Err(err),
        }
    }
}
