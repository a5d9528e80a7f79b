use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentUser, MaybeUser};
use crate::core::redis::rate_limit_key;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::auth::{SessionRestoreResponse, TokenResponse};
use crate::schemas::user::{LoginRequest, SignupRequest, UserResponse};
use crate::services::portal::{self, Action, View};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/session", get(restore_session))
}

/// Fixed-window limit per scope and subject. Redis errors never block sign-in.
async fn enforce_rate_limit(state: &AppState, scope: &str, subject: &str) -> Result<(), ApiError> {
    let security = state.settings().security();
    let key = rate_limit_key(scope, subject);

    match state
        .redis()
        .rate_limit(&key, security.auth_rate_limit, security.auth_rate_window_seconds)
        .await
    {
        Ok(decision) if !decision.allowed => {
            metrics::counter!("auth_rate_limited_total", "scope" => scope.to_string()).increment(1);
            tracing::warn!(scope, attempts = decision.attempts, "Auth rate limit exceeded");
            Err(ApiError::TooManyRequests("Too many attempts, try again later"))
        }
        Ok(_) => Ok(()),
        Err(err) => {
            tracing::warn!(error = %err, scope, "Rate limiter unavailable; allowing request");
            Ok(())
        }
    }
}

/// Active exam session of the user as `(test_id, session_id)`, if any.
async fn active_exam(state: &AppState, user: &User) -> Result<Option<(String, String)>, ApiError> {
    let session = repositories::exam_sessions::find_any_active_for_user(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to look up active exam session"))?;
    Ok(session.map(|session| (session.test_id, session.id)))
}

fn issue_token(state: &AppState, user: User, next_view: View) -> Result<TokenResponse, ApiError> {
    let access_token = security::create_access_token(&user.id, user.role, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    Ok(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        user: UserResponse::from_db(user),
        next_view,
    })
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    enforce_rate_limit(&state, "signup", &payload.email).await?;

    let existing = repositories::users::find_by_email(state.db(), &payload.email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("A user with this email already exists".to_string()));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            email: payload.email.trim(),
            display_name: payload.display_name.trim(),
            hashed_password,
            role: UserRole::Student,
            is_active: true,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            ApiError::Conflict("A user with this email already exists".to_string())
        }
        _ => ApiError::internal(e, "Failed to create user"),
    })?;

    metrics::counter!("auth_signups_total").increment(1);
    tracing::info!(user_id = %user.id, action = "signup", "User registered");

    let next_view = portal::dispatch(&View::Auth, Some(user.role), Action::SignedIn);
    Ok((StatusCode::CREATED, Json(issue_token(&state, user, next_view)?)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    enforce_rate_limit(&state, "login", &payload.email).await?;

    let user = repositories::users::find_by_email(state.db(), payload.email.trim())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("Incorrect email or password"))?;

    let valid = security::verify_password(&payload.password, &user.hashed_password)
        .map_err(|e| ApiError::internal(e, "Failed to verify password"))?;
    if !valid {
        metrics::counter!("auth_login_failures_total").increment(1);
        return Err(ApiError::Unauthorized("Incorrect email or password"));
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("This account is disabled"));
    }

    tracing::info!(user_id = %user.id, action = "login", "User signed in");

    let next_view = portal::landing(Some(user.role), active_exam(&state, &user).await?);
    Ok(Json(issue_token(&state, user, next_view)?))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn restore_session(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Json<SessionRestoreResponse>, ApiError> {
    let Some(user) = user else {
        return Ok(Json(SessionRestoreResponse {
            authenticated: false,
            user: None,
            view: portal::landing(None, None),
        }));
    };

    let view = portal::landing(Some(user.role), active_exam(&state, &user).await?);
    Ok(Json(SessionRestoreResponse {
        authenticated: true,
        user: Some(UserResponse::from_db(user)),
        view,
    }))
}
