use crate::{
    db::Repository,
    error::{AppError, AppResult},
    models::{Book, BookPatch, NewBook, PageRequest},
};

pub async fn list_books(repo: &dyn Repository, page: PageRequest) -> AppResult<(Vec<Book>, i64)> {
    repo.list_books(page).await
}

pub async fn get_book(repo: &dyn Repository, book_id: i64) -> AppResult<Book> {
    repo.get_book(book_id)
        .await?
        .ok_or_else(|| AppError::not_found("book", book_id))
}

pub async fn create_book(repo: &dyn Repository, book: NewBook) -> AppResult<Book> {
    book.validate()?;
    let stored = repo.insert_book(book).await?;
    tracing::info!(book_id = stored.id, title = %stored.title, "Created book");
    Ok(stored)
}

pub async fn replace_book(repo: &dyn Repository, book_id: i64, book: NewBook) -> AppResult<Book> {
    book.validate()?;
    repo.update_book(book_id, book)
        .await?
        .ok_or_else(|| AppError::not_found("book", book_id))
}

pub async fn patch_book(repo: &dyn Repository, book_id: i64, patch: BookPatch) -> AppResult<Book> {
    let current = get_book(repo, book_id).await?;
    replace_book(repo, book_id, patch.apply_to(&current)).await
}

pub async fn delete_book(repo: &dyn Repository, book_id: i64) -> AppResult<()> {
    if repo.delete_book(book_id).await? {
        Ok(())
    } else {
        Err(AppError::not_found("book", book_id))
    }
}
