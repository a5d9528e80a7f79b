use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::repositories::users::{CreateUser, UpdateUser};

/// Makes sure the configured root admin exists, is active and can sign in with
/// the configured password. No HTTP endpoint can create a root admin.
pub(crate) async fn ensure_root_admin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_root_admin_password.is_empty() {
        tracing::warn!("FIRST_ROOT_ADMIN_PASSWORD not configured; skipping root admin bootstrap");
        return Ok(());
    }

    let email = &admin.first_root_admin_email;
    let now = primitive_now_utc();

    if let Some(user) = repositories::users::find_by_email(state.db(), email).await? {
        let password_matches =
            security::verify_password(&admin.first_root_admin_password, &user.hashed_password)
                .unwrap_or(false);
        let up_to_date = password_matches && user.role == UserRole::RootAdmin && user.is_active;
        if up_to_date {
            tracing::info!(email = %email, "Root admin already up to date");
            return Ok(());
        }

        let hashed_password = if password_matches {
            None
        } else {
            Some(security::hash_password(&admin.first_root_admin_password)?)
        };
        repositories::users::update(
            state.db(),
            &user.id,
            UpdateUser {
                display_name: None,
                role: Some(UserRole::RootAdmin),
                is_active: Some(true),
                hashed_password,
                updated_at: now,
            },
        )
        .await?;

        tracing::info!(email = %email, "Updated root admin");
        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_root_admin_password)?;
    repositories::users::create(
        state.db(),
        CreateUser {
            id: &Uuid::new_v4().to_string(),
            email,
            display_name: "Root Admin",
            hashed_password,
            role: UserRole::RootAdmin,
            is_active: true,
            created_at: now,
        },
    )
    .await?;

    tracing::info!(email = %email, "Created root admin");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ensure_root_admin;
    use crate::core::security;
    use crate::db::types::UserRole;
    use crate::repositories;
    use crate::test_support;

    #[tokio::test]
    async fn creates_then_repairs_root_admin() {
        let ctx = test_support::setup_test_context().await;
        let email = ctx.state.settings().admin().first_root_admin_email.clone();

        ensure_root_admin(&ctx.state).await.expect("bootstrap");
        let user = repositories::users::find_by_email(ctx.state.db(), &email)
            .await
            .expect("query")
            .expect("root admin");
        assert_eq!(user.role, UserRole::RootAdmin);

        sqlx::query("UPDATE users SET role = 'student', is_active = FALSE WHERE id = $1")
            .bind(&user.id)
            .execute(ctx.state.db())
            .await
            .expect("demote");

        ensure_root_admin(&ctx.state).await.expect("bootstrap again");
        let repaired = repositories::users::find_by_id(ctx.state.db(), &user.id)
            .await
            .expect("query")
            .expect("root admin");
        assert_eq!(repaired.role, UserRole::RootAdmin);
        assert!(repaired.is_active);
        assert!(security::verify_password(
            &ctx.state.settings().admin().first_root_admin_password,
            &repaired.hashed_password
        )
        .unwrap());
    }
}
