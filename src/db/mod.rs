//! Persistence seam
//!
//! Services talk to storage through [`Repository`] only. `PgRepository` is the
//! production backend; `MemoryRepository` keeps everything in-process and is
//! used by tests and by `STORAGE=memory` runs.
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{
        Book, Movie, NewBook, NewMovie, PageRequest, PreferencesEdit, User, UserPreferences,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::{create_pool, PgRepository};

pub type SharedRepository = Arc<dyn Repository>;

/// Row-level storage operations
///
/// Every preferences write goes through [`Repository::edit_preferences`], which
/// must apply the edit while holding an exclusive lock on the user's row and
/// must create the row when it does not exist yet. Implementations must never
/// lose an edit when two callers race on the same user.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Repository: Send + Sync {
    async fn create_user(&self, username: &str) -> AppResult<User>;

    async fn get_user(&self, user_id: i64) -> AppResult<Option<User>>;

    /// Removes the user and, by cascade, their preferences row
    async fn delete_user(&self, user_id: i64) -> AppResult<bool>;

    /// Returns one page ordered by id, plus the total row count
    async fn list_movies(&self, page: PageRequest) -> AppResult<(Vec<Movie>, i64)>;

    async fn get_movie(&self, movie_id: i64) -> AppResult<Option<Movie>>;

    async fn insert_movie(&self, movie: NewMovie) -> AppResult<Movie>;

    async fn update_movie(&self, movie_id: i64, movie: NewMovie) -> AppResult<Option<Movie>>;

    async fn delete_movie(&self, movie_id: i64) -> AppResult<bool>;

    /// Updates the oldest movie carrying `movie.title`, or inserts a new one.
    ///
    /// Returns the stored row and whether it was created.
    async fn upsert_movie_by_title(&self, movie: NewMovie) -> AppResult<(Movie, bool)>;

    async fn list_books(&self, page: PageRequest) -> AppResult<(Vec<Book>, i64)>;

    async fn get_book(&self, book_id: i64) -> AppResult<Option<Book>>;

    async fn insert_book(&self, book: NewBook) -> AppResult<Book>;

    async fn update_book(&self, book_id: i64, book: NewBook) -> AppResult<Option<Book>>;

    async fn delete_book(&self, book_id: i64) -> AppResult<bool>;

    /// Creates an empty preferences row if the user has none
    async fn ensure_preferences(&self, user_id: i64) -> AppResult<()>;

    async fn get_preferences(&self, user_id: i64) -> AppResult<Option<UserPreferences>>;

    /// Locked read-modify-write of a user's preferences row
    async fn edit_preferences(
        &self,
        user_id: i64,
        edit: PreferencesEdit,
    ) -> AppResult<UserPreferences>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
