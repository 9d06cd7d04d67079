use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{extract::AppJson, AppState};
use crate::{
    error::AppResult,
    models::{PreferenceMap, ProposedPreferences, User, WatchEntry},
    services::{preferences, users, watch_history},
};

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPreferencesRequest {
    pub new_preferences: ProposedPreferences,
}

#[derive(Debug, Serialize)]
pub struct AddPreferencesResponse {
    pub new_preferences: ProposedPreferences,
    pub preferences: PreferenceMap,
}

#[derive(Debug, Deserialize)]
pub struct AddWatchHistoryRequest {
    pub movie_id: i64,
}

#[derive(Debug, Serialize)]
pub struct WatchHistoryResponse {
    pub watch_history: Vec<WatchEntry>,
}

// Handlers

pub async fn create(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = users::create_user(state.repo.as_ref(), &request.username).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<StatusCode> {
    users::delete_user(state.repo.as_ref(), user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    AppJson(request): AppJson<AddPreferencesRequest>,
) -> AppResult<(StatusCode, Json<AddPreferencesResponse>)> {
    preferences::validate_proposed(&request.new_preferences)?;

    let merged = preferences::merge_preferences(
        state.repo.as_ref(),
        user_id,
        request.new_preferences.clone(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(AddPreferencesResponse {
            new_preferences: request.new_preferences,
            preferences: merged.preferences,
        }),
    ))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<PreferenceMap>> {
    Ok(Json(
        preferences::fetch_preferences(state.repo.as_ref(), user_id).await?,
    ))
}

pub async fn add_watch_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    AppJson(request): AppJson<AddWatchHistoryRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let entry =
        watch_history::add_watch_history(state.repo.as_ref(), user_id, request.movie_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Movie added to watch history",
            "entry": entry,
        })),
    ))
}

pub async fn get_watch_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<WatchHistoryResponse>> {
    let watch_history = watch_history::fetch_watch_history(state.repo.as_ref(), user_id).await?;
    Ok(Json(WatchHistoryResponse { watch_history }))
}
