use crate::{
    db::Repository,
    error::{AppError, AppResult},
    models::{Movie, MoviePatch, NewMovie, PageRequest},
};

pub async fn list_movies(
    repo: &dyn Repository,
    page: PageRequest,
) -> AppResult<(Vec<Movie>, i64)> {
    repo.list_movies(page).await
}

pub async fn get_movie(repo: &dyn Repository, movie_id: i64) -> AppResult<Movie> {
    repo.get_movie(movie_id)
        .await?
        .ok_or_else(|| AppError::not_found("movie", movie_id))
}

pub async fn create_movie(repo: &dyn Repository, movie: NewMovie) -> AppResult<Movie> {
    movie.validate()?;
    let stored = repo.insert_movie(movie).await?;
    tracing::info!(movie_id = stored.id, title = %stored.title, "Created movie");
    Ok(stored)
}

pub async fn replace_movie(
    repo: &dyn Repository,
    movie_id: i64,
    movie: NewMovie,
) -> AppResult<Movie> {
    movie.validate()?;
    repo.update_movie(movie_id, movie)
        .await?
        .ok_or_else(|| AppError::not_found("movie", movie_id))
}

pub async fn patch_movie(
    repo: &dyn Repository,
    movie_id: i64,
    patch: MoviePatch,
) -> AppResult<Movie> {
    let current = get_movie(repo, movie_id).await?;
    replace_movie(repo, movie_id, patch.apply_to(&current)).await
}

pub async fn delete_movie(repo: &dyn Repository, movie_id: i64) -> AppResult<()> {
    if repo.delete_movie(movie_id).await? {
        tracing::info!(movie_id, "Deleted movie");
        Ok(())
    } else {
        Err(AppError::not_found("movie", movie_id))
    }
}

/// Create-or-update keyed on title.
///
/// The record is validated (title present, release year in range) before the
/// repository is touched, so a rejected record writes nothing.
pub async fn upsert_movie(repo: &dyn Repository, movie: NewMovie) -> AppResult<(Movie, bool)> {
    movie.validate()?;
    let (stored, created) = repo.upsert_movie_by_title(movie).await?;
    tracing::debug!(movie_id = stored.id, created, title = %stored.title, "Upserted movie");
    Ok((stored, created))
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Utc};
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::db::{MemoryRepository, MockRepository};

    #[tokio::test]
    async fn test_upsert_year_bounds() {
        let repo = MemoryRepository::new();
        let current = Utc::now().year();

        let err = assert_err!(upsert_movie(&repo, NewMovie::new("X").with_release_year(1887)).await);
        assert!(matches!(err, AppError::Validation(_)));
        assert_ok!(upsert_movie(&repo, NewMovie::new("X").with_release_year(1888)).await);
        assert_ok!(upsert_movie(&repo, NewMovie::new("X").with_release_year(current)).await);
        let err = assert_err!(
            upsert_movie(&repo, NewMovie::new("X").with_release_year(current + 1)).await
        );
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_rejected_record_never_reaches_repository() {
        let mut repo = MockRepository::new();
        repo.expect_upsert_movie_by_title().never();

        let result = upsert_movie(&repo, NewMovie::new("Too Early").with_release_year(1700)).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_upsert_reports_created_then_updated() {
        let repo = MemoryRepository::new();
        let (first, created) = upsert_movie(&repo, NewMovie::new("Heat").with_genres(["Crime"]))
            .await
            .unwrap();
        assert!(created);

        let (second, created) =
            upsert_movie(&repo, NewMovie::new("Heat").with_genres(["Crime", "Thriller"]))
                .await
                .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.genres.len(), 2);
    }

    #[tokio::test]
    async fn test_patch_updates_title_only() {
        let repo = MemoryRepository::new();
        let movie = create_movie(&repo, NewMovie::new("Alien").with_release_year(1979))
            .await
            .unwrap();

        let patch = MoviePatch {
            title: Some("Aliens".to_string()),
            ..Default::default()
        };
        let updated = patch_movie(&repo, movie.id, patch).await.unwrap();
        assert_eq!(updated.title, "Aliens");
        assert_eq!(updated.release_year, Some(1979));
    }

    #[tokio::test]
    async fn test_missing_movie_paths() {
        let repo = MemoryRepository::new();
        assert!(matches!(get_movie(&repo, 5).await, Err(AppError::NotFound(_))));
        assert!(matches!(delete_movie(&repo, 5).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            replace_movie(&repo, 5, NewMovie::new("Nope")).await,
            Err(AppError::NotFound(_))
        ));
    }
}
