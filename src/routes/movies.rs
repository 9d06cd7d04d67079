use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::{extract::AppJson, AppState};
use crate::{
    error::AppResult,
    models::{Movie, MoviePatch, NewMovie, Page, PageParams, PageRequest},
    services::movies,
};

const MOVIES_PATH: &str = "/api/v1/movies";

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Movie>>> {
    let request = PageRequest::resolve(params, state.page_size);
    let (results, count) = movies::list_movies(state.repo.as_ref(), request).await?;
    Ok(Json(Page::new(results, count, request, MOVIES_PATH)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AppJson(movie): AppJson<NewMovie>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    let movie = movies::create_movie(state.repo.as_ref(), movie).await?;
    Ok((StatusCode::CREATED, Json(movie)))
}

pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
) -> AppResult<Json<Movie>> {
    Ok(Json(movies::get_movie(state.repo.as_ref(), movie_id).await?))
}

pub async fn replace(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
    AppJson(movie): AppJson<NewMovie>,
) -> AppResult<Json<Movie>> {
    Ok(Json(
        movies::replace_movie(state.repo.as_ref(), movie_id, movie).await?,
    ))
}

pub async fn patch(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
    AppJson(patch): AppJson<MoviePatch>,
) -> AppResult<Json<Movie>> {
    Ok(Json(
        movies::patch_movie(state.repo.as_ref(), movie_id, patch).await?,
    ))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<i64>,
) -> AppResult<StatusCode> {
    movies::delete_movie(state.repo.as_ref(), movie_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
