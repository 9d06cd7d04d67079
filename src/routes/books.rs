use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::{extract::AppJson, AppState};
use crate::{
    error::AppResult,
    models::{Book, BookPatch, NewBook, Page, PageParams, PageRequest},
    services::books,
};

const BOOKS_PATH: &str = "/api/v1/books";

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Book>>> {
    let request = PageRequest::resolve(params, state.page_size);
    let (results, count) = books::list_books(state.repo.as_ref(), request).await?;
    Ok(Json(Page::new(results, count, request, BOOKS_PATH)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AppJson(book): AppJson<NewBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = books::create_book(state.repo.as_ref(), book).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> AppResult<Json<Book>> {
    Ok(Json(books::get_book(state.repo.as_ref(), book_id).await?))
}

pub async fn replace(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    AppJson(book): AppJson<NewBook>,
) -> AppResult<Json<Book>> {
    Ok(Json(books::replace_book(state.repo.as_ref(), book_id, book).await?))
}

pub async fn patch(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
    AppJson(patch): AppJson<BookPatch>,
) -> AppResult<Json<Book>> {
    Ok(Json(books::patch_book(state.repo.as_ref(), book_id, patch).await?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<i64>,
) -> AppResult<StatusCode> {
    books::delete_book(state.repo.as_ref(), book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
