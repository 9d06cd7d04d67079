use crate::{
    db::Repository,
    error::{AppError, AppResult},
    models::User,
};

use super::preferences::ensure_preferences_row;

pub const MAX_USERNAME_LEN: usize = 150;

/// Creates an account and, directly afterwards, its empty preferences row
pub async fn create_user(repo: &dyn Repository, username: &str) -> AppResult<User> {
    let username = username.trim();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be 1 to {} characters",
            MAX_USERNAME_LEN
        )));
    }

    let user = repo.create_user(username).await?;
    ensure_preferences_row(repo, user.id).await?;

    tracing::info!(user_id = user.id, "Created user");
    Ok(user)
}

pub async fn delete_user(repo: &dyn Repository, user_id: i64) -> AppResult<()> {
    if repo.delete_user(user_id).await? {
        tracing::info!(user_id, "Deleted user");
        Ok(())
    } else {
        Err(AppError::not_found("user", user_id))
    }
}
