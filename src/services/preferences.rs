use serde_json::Value;

use crate::{
    db::Repository,
    error::{AppError, AppResult},
    models::{PreferenceMap, PreferenceValue, PreferencesEdit, ProposedPreferences, UserPreferences},
};

/// Preference categories accepted from clients
pub const PREFERENCE_KEYS: &[&str] = &["genre", "director", "actor", "year"];

/// Merges proposed values into the user's stored preference map.
///
/// Set-union per key, first-seen order kept. The repository applies the merge
/// under a row lock and creates the row if it is missing, so two concurrent
/// merges for one user both land.
pub async fn merge_preferences(
    repo: &dyn Repository,
    user_id: i64,
    proposed: ProposedPreferences,
) -> AppResult<UserPreferences> {
    if repo.get_user(user_id).await?.is_none() {
        return Err(AppError::not_found("user", user_id));
    }

    let prefs = repo
        .edit_preferences(user_id, PreferencesEdit::Merge(proposed))
        .await?;

    tracing::info!(
        user_id,
        categories = prefs.preferences.len(),
        "Merged user preferences"
    );
    Ok(prefs)
}

pub async fn fetch_preferences(repo: &dyn Repository, user_id: i64) -> AppResult<PreferenceMap> {
    repo.get_preferences(user_id)
        .await?
        .map(|prefs| prefs.preferences)
        .ok_or_else(|| AppError::NotFound(format!("no preferences recorded for user {}", user_id)))
}

/// Post-user-creation hook: makes sure the user owns an (empty) preferences row
pub async fn ensure_preferences_row(repo: &dyn Repository, user_id: i64) -> AppResult<()> {
    repo.ensure_preferences(user_id).await?;
    tracing::debug!(user_id, "Preferences row ensured");
    Ok(())
}

/// Shape check for client-supplied payloads
pub fn validate_proposed(proposed: &ProposedPreferences) -> AppResult<()> {
    if proposed.is_empty() {
        return Err(AppError::Validation(
            "new_preferences must contain at least one entry".to_string(),
        ));
    }

    for (key, value) in proposed {
        if !PREFERENCE_KEYS.contains(&key.as_str()) {
            return Err(AppError::Validation(format!(
                "unknown preference '{}', expected one of: {}",
                key,
                PREFERENCE_KEYS.join(", ")
            )));
        }
        let ok = match value {
            PreferenceValue::One(v) => is_scalar(v),
            PreferenceValue::Many(values) => !values.is_empty() && values.iter().all(is_scalar),
        };
        if !ok {
            return Err(AppError::Validation(format!(
                "preference '{}' must be a string, number, boolean or a non-empty list of them",
                key
            )));
        }
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}
