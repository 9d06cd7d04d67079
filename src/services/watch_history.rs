use crate::{
    db::Repository,
    error::{AppError, AppResult},
    models::{PreferencesEdit, WatchEntry},
};

/// Appends a snapshot of the movie's current metadata to the user's history.
///
/// The snapshot is a copy: later edits to the movie leave it untouched.
/// Watching the same movie twice records two entries.
pub async fn add_watch_history(
    repo: &dyn Repository,
    user_id: i64,
    movie_id: i64,
) -> AppResult<WatchEntry> {
    let movie = repo
        .get_movie(movie_id)
        .await?
        .ok_or_else(|| AppError::not_found("movie", movie_id))?;

    if repo.get_user(user_id).await?.is_none() {
        return Err(AppError::not_found("user", user_id));
    }

    let entry = WatchEntry::from(&movie);
    let prefs = repo
        .edit_preferences(user_id, PreferencesEdit::AppendWatch(entry.clone()))
        .await?;

    tracing::info!(
        user_id,
        movie_id,
        history_len = prefs.watch_history.len(),
        "Recorded watch history entry"
    );
    Ok(entry)
}

pub async fn fetch_watch_history(
    repo: &dyn Repository,
    user_id: i64,
) -> AppResult<Vec<WatchEntry>> {
    repo.get_preferences(user_id)
        .await?
        .map(|prefs| prefs.watch_history)
        .ok_or_else(|| {
            AppError::NotFound(format!("no watch history recorded for user {}", user_id))
        })
}
