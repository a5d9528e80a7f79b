use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentRootAdmin;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::user::{PromoteAdminRequest, UserResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_admins).post(promote_admin))
        .route("/:user_id", delete(demote_admin))
}

async fn set_role(state: &AppState, user: &User, role: UserRole) -> Result<User, ApiError> {
    repositories::users::update(
        state.db(),
        &user.id,
        repositories::users::UpdateUser {
            display_name: None,
            role: Some(role),
            is_active: None,
            hashed_password: None,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update user role"))?;

    repositories::users::find_by_id(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to reload user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

async fn list_admins(
    CurrentRootAdmin(_root): CurrentRootAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let mut admins = repositories::users::list_by_role(state.db(), UserRole::RootAdmin)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list root admins"))?;
    admins.extend(
        repositories::users::list_by_role(state.db(), UserRole::Admin)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list admins"))?,
    );

    Ok(Json(admins.into_iter().map(UserResponse::from_db).collect()))
}

async fn promote_admin(
    CurrentRootAdmin(root): CurrentRootAdmin,
    State(state): State<AppState>,
    Json(payload): Json<PromoteAdminRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let user = repositories::users::find_by_email(state.db(), payload.email.trim())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or_else(|| ApiError::NotFound("No user with this email".to_string()))?;

    match user.role {
        UserRole::Admin => Ok(Json(UserResponse::from_db(user))),
        UserRole::RootAdmin => Err(ApiError::Conflict("User is already a root admin".to_string())),
        UserRole::Student => {
            let promoted = set_role(&state, &user, UserRole::Admin).await?;
            tracing::info!(
                actor_id = %root.id,
                user_id = %promoted.id,
                action = "promote_admin",
                "User promoted to admin"
            );
            Ok(Json(UserResponse::from_db(promoted)))
        }
    }
}

async fn demote_admin(
    Path(user_id): Path<String>,
    CurrentRootAdmin(root): CurrentRootAdmin,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, ApiError> {
    if user_id == root.id {
        return Err(ApiError::Conflict("You cannot demote yourself".to_string()));
    }

    let user = repositories::users::find_by_id(state.db(), &user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    match user.role {
        UserRole::RootAdmin => Err(ApiError::Forbidden("Root admins cannot be demoted")),
        UserRole::Student => Err(ApiError::Conflict("User is not an admin".to_string())),
        UserRole::Admin => {
            let demoted = set_role(&state, &user, UserRole::Student).await?;
            tracing::info!(
                actor_id = %root.id,
                user_id = %demoted.id,
                action = "demote_admin",
                "Admin demoted to student"
            );
            Ok(Json(UserResponse::from_db(demoted)))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::db::types::UserRole;
    use crate::test_support;

    #[tokio::test]
    async fn root_admin_promotes_and_demotes() {
        let ctx = test_support::setup_test_context().await;
        let root =
            test_support::insert_user(ctx.state.db(), "root@x.test", "Root", UserRole::RootAdmin)
                .await;
        let student =
            test_support::insert_user(ctx.state.db(), "stu@x.test", "Stu", UserRole::Student).await;
        let token = test_support::bearer_token(&root, ctx.state.settings());

        let promoted = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/admins",
                Some(&token),
                Some(json!({"email": "STU@x.test"})),
            ))
            .await
            .expect("promote");
        assert_eq!(promoted.status(), StatusCode::OK);
        assert_eq!(test_support::read_json(promoted).await["role"], "admin");

        let listed = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::GET, "/api/v1/admins", Some(&token), None))
            .await
            .expect("list");
        let listed = test_support::read_json(listed).await;
        assert_eq!(listed.as_array().map(Vec::len), Some(2));

        let demoted = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::DELETE,
                &format!("/api/v1/admins/{}", student.id),
                Some(&token),
                None,
            ))
            .await
            .expect("demote");
        assert_eq!(demoted.status(), StatusCode::OK);
        assert_eq!(test_support::read_json(demoted).await["role"], "student");
    }

    #[tokio::test]
    async fn root_admin_cannot_demote_itself_and_admins_are_forbidden() {
        let ctx = test_support::setup_test_context().await;
        let root =
            test_support::insert_user(ctx.state.db(), "root@x.test", "Root", UserRole::RootAdmin)
                .await;
        let admin =
            test_support::insert_user(ctx.state.db(), "admin@x.test", "Admin", UserRole::Admin).await;

        let root_token = test_support::bearer_token(&root, ctx.state.settings());
        let self_demote = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::DELETE,
                &format!("/api/v1/admins/{}", root.id),
                Some(&root_token),
                None,
            ))
            .await
            .expect("self demote");
        assert_eq!(self_demote.status(), StatusCode::CONFLICT);

        let admin_token = test_support::bearer_token(&admin, ctx.state.settings());
        let forbidden = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::GET,
                "/api/v1/admins",
                Some(&admin_token),
                None,
            ))
            .await
            .expect("list");
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }
}
