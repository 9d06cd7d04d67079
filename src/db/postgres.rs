use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        Book, Movie, NewBook, NewMovie, PageRequest, PreferenceMap, PreferencesEdit, User,
        UserPreferences, WatchEntry,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

const MOVIE_COLUMNS: &str = "id, title, genres, country, extra_data, release_year";
const BOOK_COLUMNS: &str = "id, title, author, isbn, publication_year";

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct MovieRow {
    id: i64,
    title: String,
    genres: Json<Vec<String>>,
    country: Option<String>,
    extra_data: Json<Map<String, Value>>,
    release_year: Option<i32>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Movie {
            id: row.id,
            title: row.title,
            genres: row.genres.0,
            country: row.country,
            extra_data: row.extra_data.0,
            release_year: row.release_year,
        }
    }
}

#[derive(FromRow)]
struct BookRow {
    id: i64,
    title: String,
    author: String,
    isbn: String,
    publication_year: i32,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: row.id,
            title: row.title,
            author: row.author,
            isbn: row.isbn,
            publication_year: row.publication_year,
        }
    }
}

#[derive(FromRow)]
struct PreferencesRow {
    user_id: i64,
    preferences: Json<PreferenceMap>,
    watch_history: Json<Vec<WatchEntry>>,
}

impl From<PreferencesRow> for UserPreferences {
    fn from(row: PreferencesRow) -> Self {
        UserPreferences {
            user_id: row.user_id,
            preferences: row.preferences.0,
            watch_history: row.watch_history.0,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_foreign_key_violation())
        .unwrap_or(false)
}

/// Maps constraint failures on movie writes to `Conflict`
fn movie_write_error(err: sqlx::Error, title: &str) -> AppError {
    if is_unique_violation(&err) {
        AppError::Conflict(format!(
            "a movie titled '{}' with the same country and release year already exists",
            title
        ))
    } else {
        AppError::Database(err)
    }
}

/// Maps a missing owner row on preferences writes to `NotFound`
fn preferences_write_error(err: sqlx::Error, user_id: i64) -> AppError {
    if is_foreign_key_violation(&err) {
        AppError::not_found("user", user_id)
    } else {
        AppError::Database(err)
    }
}

/// Postgres-backed repository
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, username: &str) -> AppResult<User> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (username) VALUES ($1) RETURNING id, username, created_at",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map(User::from)
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("username '{}' is already taken", username))
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn get_user(&self, user_id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn delete_user(&self, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_movies(&self, page: PageRequest) -> AppResult<(Vec<Movie>, i64)> {
        let rows = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {} FROM movies ORDER BY id LIMIT $1 OFFSET $2",
            MOVIE_COLUMNS
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;
        Ok((rows.into_iter().map(Movie::from).collect(), count))
    }

    async fn get_movie(&self, movie_id: i64) -> AppResult<Option<Movie>> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {} FROM movies WHERE id = $1",
            MOVIE_COLUMNS
        ))
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Movie::from))
    }

    async fn insert_movie(&self, movie: NewMovie) -> AppResult<Movie> {
        sqlx::query_as::<_, MovieRow>(&format!(
            "INSERT INTO movies (title, genres, country, extra_data, release_year) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            MOVIE_COLUMNS
        ))
        .bind(&movie.title)
        .bind(Json(&movie.genres))
        .bind(&movie.country)
        .bind(Json(&movie.extra_data))
        .bind(movie.release_year)
        .fetch_one(&self.pool)
        .await
        .map(Movie::from)
        .map_err(|e| movie_write_error(e, &movie.title))
    }

    async fn update_movie(&self, movie_id: i64, movie: NewMovie) -> AppResult<Option<Movie>> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "UPDATE movies SET title = $2, genres = $3, country = $4, extra_data = $5, \
             release_year = $6 WHERE id = $1 RETURNING {}",
            MOVIE_COLUMNS
        ))
        .bind(movie_id)
        .bind(&movie.title)
        .bind(Json(&movie.genres))
        .bind(&movie.country)
        .bind(Json(&movie.extra_data))
        .bind(movie.release_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| movie_write_error(e, &movie.title))?;
        Ok(row.map(Movie::from))
    }

    async fn delete_movie(&self, movie_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_movie_by_title(&self, movie: NewMovie) -> AppResult<(Movie, bool)> {
        let mut tx = self.pool.begin().await?;

        // Title is not a unique column; serialize concurrent upserts of one title
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&movie.title)
            .execute(&mut *tx)
            .await?;

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM movies WHERE title = $1 ORDER BY id LIMIT 1 FOR UPDATE",
        )
        .bind(&movie.title)
        .fetch_optional(&mut *tx)
        .await?;

        let (row, created) = match existing {
            Some(movie_id) => {
                let row = sqlx::query_as::<_, MovieRow>(&format!(
                    "UPDATE movies SET genres = $2, country = $3, extra_data = $4, \
                     release_year = $5 WHERE id = $1 RETURNING {}",
                    MOVIE_COLUMNS
                ))
                .bind(movie_id)
                .bind(Json(&movie.genres))
                .bind(&movie.country)
                .bind(Json(&movie.extra_data))
                .bind(movie.release_year)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| movie_write_error(e, &movie.title))?;
                (row, false)
            }
            None => {
                let row = sqlx::query_as::<_, MovieRow>(&format!(
                    "INSERT INTO movies (title, genres, country, extra_data, release_year) \
                     VALUES ($1, $2, $3, $4, $5) RETURNING {}",
                    MOVIE_COLUMNS
                ))
                .bind(&movie.title)
                .bind(Json(&movie.genres))
                .bind(&movie.country)
                .bind(Json(&movie.extra_data))
                .bind(movie.release_year)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| movie_write_error(e, &movie.title))?;
                (row, true)
            }
        };

        tx.commit().await?;
        Ok((Movie::from(row), created))
    }

    async fn list_books(&self, page: PageRequest) -> AppResult<(Vec<Book>, i64)> {
        let rows = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {} FROM books ORDER BY id LIMIT $1 OFFSET $2",
            BOOK_COLUMNS
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok((rows.into_iter().map(Book::from).collect(), count))
    }

    async fn get_book(&self, book_id: i64) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {} FROM books WHERE id = $1",
            BOOK_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Book::from))
    }

    async fn insert_book(&self, book: NewBook) -> AppResult<Book> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "INSERT INTO books (title, author, isbn, publication_year) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.publication_year)
        .fetch_one(&self.pool)
        .await?;
        Ok(Book::from(row))
    }

    async fn update_book(&self, book_id: i64, book: NewBook) -> AppResult<Option<Book>> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "UPDATE books SET title = $2, author = $3, isbn = $4, publication_year = $5 \
             WHERE id = $1 RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(book_id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.publication_year)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Book::from))
    }

    async fn delete_book(&self, book_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ensure_preferences(&self, user_id: i64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO user_movie_preferences (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| preferences_write_error(e, user_id))?;
        Ok(())
    }

    async fn get_preferences(&self, user_id: i64) -> AppResult<Option<UserPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            "SELECT user_id, preferences, watch_history FROM user_movie_preferences \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserPreferences::from))
    }

    async fn edit_preferences(
        &self,
        user_id: i64,
        edit: PreferencesEdit,
    ) -> AppResult<UserPreferences> {
        // A second pass only happens when a concurrent first write won the insert
        for attempt in 0..2 {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, PreferencesRow>(
                "SELECT user_id, preferences, watch_history FROM user_movie_preferences \
                 WHERE user_id = $1 FOR UPDATE",
            )
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                let mut prefs = UserPreferences::from(row);
                edit.apply(&mut prefs);
                sqlx::query(
                    "UPDATE user_movie_preferences SET preferences = $2, watch_history = $3 \
                     WHERE user_id = $1",
                )
                .bind(user_id)
                .bind(Json(&prefs.preferences))
                .bind(Json(&prefs.watch_history))
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                return Ok(prefs);
            }

            let mut prefs = UserPreferences::new(user_id);
            edit.apply(&mut prefs);
            let inserted = sqlx::query(
                "INSERT INTO user_movie_preferences (user_id, preferences, watch_history) \
                 VALUES ($1, $2, $3)",
            )
            .bind(user_id)
            .bind(Json(&prefs.preferences))
            .bind(Json(&prefs.watch_history))
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {
                    tx.commit().await?;
                    return Ok(prefs);
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::debug!(user_id, attempt, "Preferences row created concurrently, retrying under lock");
                    tx.rollback().await?;
                }
                Err(e) => return Err(preferences_write_error(e, user_id)),
            }
        }

        Err(AppError::Internal(format!(
            "could not lock preferences row for user {}",
            user_id
        )))
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

// These need a reachable Postgres: DATABASE_URL=... cargo test -- --ignored
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::models::ProposedPreferences;

    fn merge_of(value: serde_json::Value) -> PreferencesEdit {
        let proposed: ProposedPreferences = serde_json::from_value(value).unwrap();
        PreferencesEdit::Merge(proposed)
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_missing_country_and_year_still_collide(pool: PgPool) {
        let repo = PgRepository::new(pool);
        assert_ok!(repo.insert_movie(NewMovie::new("Heat")).await);
        let err = assert_err!(repo.insert_movie(NewMovie::new("Heat")).await);
        assert!(matches!(err, AppError::Conflict(_)));

        assert_ok!(
            repo.insert_movie(NewMovie::new("Heat").with_release_year(1995))
                .await
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_merges_on_new_user(pool: PgPool) {
        let repo = Arc::new(PgRepository::new(pool));
        let user_id = repo.create_user("racer").await.unwrap().id;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                let edit = merge_of(json!({ "genre": format!("g{}", i) }));
                tokio::spawn(async move { repo.edit_preferences(user_id, edit).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = repo.get_preferences(user_id).await.unwrap().unwrap();
        assert_eq!(stored.preferences["genre"].len(), 16);
        for i in 0..16 {
            assert!(stored.preferences["genre"].contains(&json!(format!("g{}", i))));
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_first_watches(pool: PgPool) {
        let repo = Arc::new(PgRepository::new(pool));
        let user_id = repo.create_user("viewer").await.unwrap().id;
        let movie = repo
            .insert_movie(NewMovie::new("Stalker").with_release_year(1979))
            .await
            .unwrap();
        let entry = WatchEntry::from(&movie);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let repo = repo.clone();
                let edit = PreferencesEdit::AppendWatch(entry.clone());
                tokio::spawn(async move { repo.edit_preferences(user_id, edit).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = repo.get_preferences(user_id).await.unwrap().unwrap();
        assert_eq!(stored.watch_history.len(), 16);
        assert!(stored.watch_history.iter().all(|e| *e == entry));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_upserts_of_one_title(pool: PgPool) {
        let repo = Arc::new(PgRepository::new(pool));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let movie = NewMovie::new("Mirror").with_genres(["Drama"]);
                tokio::spawn(async move { repo.upsert_movie_by_title(movie).await })
            })
            .collect();
        let mut created = 0;
        for task in tasks {
            let (_, was_created) = task.await.unwrap().unwrap();
            created += usize::from(was_created);
        }
        assert_eq!(created, 1);

        let (movies, count) = repo
            .list_movies(PageRequest {
                page: 1,
                page_size: 10,
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(movies[0].title, "Mirror");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_edit_for_missing_user_is_not_found(pool: PgPool) {
        let repo = PgRepository::new(pool);
        let err = assert_err!(
            repo.edit_preferences(404, merge_of(json!({ "genre": "drama" })))
                .await
        );
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
