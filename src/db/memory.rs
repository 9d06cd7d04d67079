use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        Book, Movie, NewBook, NewMovie, PageRequest, PreferencesEdit, User, UserPreferences,
    },
};

/// In-process tables; ids are assigned from per-table counters starting at 1
#[derive(Default)]
struct Tables {
    last_user_id: i64,
    last_movie_id: i64,
    last_book_id: i64,
    users: BTreeMap<i64, User>,
    movies: BTreeMap<i64, Movie>,
    books: BTreeMap<i64, Book>,
    preferences: HashMap<i64, UserPreferences>,
}

impl Tables {
    fn check_movie_identity(&self, candidate: &NewMovie, except: Option<i64>) -> AppResult<()> {
        let clash = self
            .movies
            .values()
            .any(|m| Some(m.id) != except && m.same_identity(candidate));
        if clash {
            return Err(AppError::Conflict(format!(
                "a movie titled '{}' with the same country and release year already exists",
                candidate.title
            )));
        }
        Ok(())
    }

    fn insert_movie(&mut self, movie: NewMovie) -> AppResult<Movie> {
        self.check_movie_identity(&movie, None)?;
        self.last_movie_id += 1;
        let stored = build_movie(self.last_movie_id, movie);
        self.movies.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn replace_movie(&mut self, movie_id: i64, movie: NewMovie) -> AppResult<Option<Movie>> {
        if !self.movies.contains_key(&movie_id) {
            return Ok(None);
        }
        self.check_movie_identity(&movie, Some(movie_id))?;
        let stored = build_movie(movie_id, movie);
        self.movies.insert(movie_id, stored.clone());
        Ok(Some(stored))
    }
}

fn build_movie(id: i64, movie: NewMovie) -> Movie {
    Movie {
        id,
        title: movie.title,
        genres: movie.genres,
        country: movie.country,
        extra_data: movie.extra_data,
        release_year: movie.release_year,
    }
}

fn build_book(id: i64, book: NewBook) -> Book {
    Book {
        id,
        title: book.title,
        author: book.author,
        isbn: book.isbn,
        publication_year: book.publication_year,
    }
}

fn page_of<T: Clone>(rows: &BTreeMap<i64, T>, page: PageRequest) -> (Vec<T>, i64) {
    let items = rows
        .values()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect();
    (items, rows.len() as i64)
}

/// Repository kept entirely in memory
///
/// Every write takes the table lock for its whole read-modify-write, so
/// concurrent preference edits are serialized the same way row locks
/// serialize them in Postgres.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, username: &str) -> AppResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == username) {
            return Err(AppError::Conflict(format!(
                "username '{}' is already taken",
                username
            )));
        }
        tables.last_user_id += 1;
        let user = User {
            id: tables.last_user_id,
            username: username.to_string(),
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: i64) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn delete_user(&self, user_id: i64) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        tables.preferences.remove(&user_id);
        Ok(tables.users.remove(&user_id).is_some())
    }

    async fn list_movies(&self, page: PageRequest) -> AppResult<(Vec<Movie>, i64)> {
        Ok(page_of(&self.tables.read().await.movies, page))
    }

    async fn get_movie(&self, movie_id: i64) -> AppResult<Option<Movie>> {
        Ok(self.tables.read().await.movies.get(&movie_id).cloned())
    }

    async fn insert_movie(&self, movie: NewMovie) -> AppResult<Movie> {
        self.tables.write().await.insert_movie(movie)
    }

    async fn update_movie(&self, movie_id: i64, movie: NewMovie) -> AppResult<Option<Movie>> {
        self.tables.write().await.replace_movie(movie_id, movie)
    }

    async fn delete_movie(&self, movie_id: i64) -> AppResult<bool> {
        Ok(self.tables.write().await.movies.remove(&movie_id).is_some())
    }

    async fn upsert_movie_by_title(&self, movie: NewMovie) -> AppResult<(Movie, bool)> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .movies
            .values()
            .find(|m| m.title == movie.title)
            .map(|m| m.id);
        match existing {
            Some(movie_id) => {
                let stored = tables
                    .replace_movie(movie_id, movie)?
                    .ok_or_else(|| AppError::Internal("movie vanished during upsert".to_string()))?;
                Ok((stored, false))
            }
            None => Ok((tables.insert_movie(movie)?, true)),
        }
    }

    async fn list_books(&self, page: PageRequest) -> AppResult<(Vec<Book>, i64)> {
        Ok(page_of(&self.tables.read().await.books, page))
    }

    async fn get_book(&self, book_id: i64) -> AppResult<Option<Book>> {
        Ok(self.tables.read().await.books.get(&book_id).cloned())
    }

    async fn insert_book(&self, book: NewBook) -> AppResult<Book> {
        let mut tables = self.tables.write().await;
        tables.last_book_id += 1;
        let stored = build_book(tables.last_book_id, book);
        tables.books.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_book(&self, book_id: i64, book: NewBook) -> AppResult<Option<Book>> {
        let mut tables = self.tables.write().await;
        match tables.books.get_mut(&book_id) {
            Some(slot) => {
                *slot = build_book(book_id, book);
                Ok(Some(slot.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_book(&self, book_id: i64) -> AppResult<bool> {
        Ok(self.tables.write().await.books.remove(&book_id).is_some())
    }

    async fn ensure_preferences(&self, user_id: i64) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(AppError::not_found("user", user_id));
        }
        tables
            .preferences
            .entry(user_id)
            .or_insert_with(|| UserPreferences::new(user_id));
        Ok(())
    }

    async fn get_preferences(&self, user_id: i64) -> AppResult<Option<UserPreferences>> {
        Ok(self.tables.read().await.preferences.get(&user_id).cloned())
    }

    async fn edit_preferences(
        &self,
        user_id: i64,
        edit: PreferencesEdit,
    ) -> AppResult<UserPreferences> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(AppError::not_found("user", user_id));
        }
        let prefs = tables
            .preferences
            .entry(user_id)
            .or_insert_with(|| UserPreferences::new(user_id));
        edit.apply(prefs);
        Ok(prefs.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn page(page: u32, page_size: u32) -> PageRequest {
        PageRequest { page, page_size }
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let repo = MemoryRepository::new();
        let a = repo.insert_movie(NewMovie::new("A")).await.unwrap();
        let b = repo.insert_movie(NewMovie::new("B")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
    }

    #[tokio::test]
    async fn test_identity_triple_is_unique() {
        let repo = MemoryRepository::new();
        let movie = NewMovie::new("Alien").with_release_year(1979);
        assert_ok!(repo.insert_movie(movie.clone()).await);
        let err = assert_err!(repo.insert_movie(movie).await);
        assert!(matches!(err, AppError::Conflict(_)));

        // Same title, different year is a different movie
        assert_ok!(
            repo.insert_movie(NewMovie::new("Alien").with_release_year(1980))
                .await
        );
    }

    #[tokio::test]
    async fn test_missing_country_and_year_still_collide() {
        let repo = MemoryRepository::new();
        assert_ok!(repo.insert_movie(NewMovie::new("Heat")).await);
        let err = assert_err!(repo.insert_movie(NewMovie::new("Heat")).await);
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_upsert_by_title_updates_oldest_match() {
        let repo = MemoryRepository::new();
        let first = repo
            .insert_movie(NewMovie::new("Solaris").with_release_year(1972))
            .await
            .unwrap();
        repo.insert_movie(NewMovie::new("Solaris").with_release_year(2002))
            .await
            .unwrap();

        let (stored, created) = repo
            .upsert_movie_by_title(NewMovie::new("Solaris").with_genres(["Drama"]))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.genres, vec!["Drama".to_string()]);
        assert_eq!(stored.release_year, None);
    }

    #[tokio::test]
    async fn test_upsert_inserts_unknown_title() {
        let repo = MemoryRepository::new();
        let (stored, created) = repo
            .upsert_movie_by_title(NewMovie::new("Stalker"))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(stored.title, "Stalker");
    }

    #[tokio::test]
    async fn test_list_pages() {
        let repo = MemoryRepository::new();
        for i in 0..5 {
            repo.insert_movie(NewMovie::new(format!("Movie {}", i)))
                .await
                .unwrap();
        }
        let (items, count) = repo.list_movies(page(2, 2)).await.unwrap();
        assert_eq!(count, 5);
        let ids: Vec<i64> = items.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let repo = MemoryRepository::new();
        assert_ok!(repo.create_user("user_0").await);
        let err = assert_err!(repo.create_user("user_0").await);
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_user_cascades_preferences() {
        let repo = MemoryRepository::new();
        let user = repo.create_user("user_1").await.unwrap();
        repo.ensure_preferences(user.id).await.unwrap();
        assert!(repo.get_preferences(user.id).await.unwrap().is_some());

        assert!(repo.delete_user(user.id).await.unwrap());
        assert!(repo.get_preferences(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edit_requires_user() {
        let repo = MemoryRepository::new();
        let edit = PreferencesEdit::Merge(Default::default());
        let err = assert_err!(repo.edit_preferences(42, edit).await);
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
