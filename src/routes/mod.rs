use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

pub mod books;
pub mod extract;
pub mod movies;
pub mod state;
pub mod uploads;
pub mod users;

pub use state::AppState;

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Movies
        .route("/movies", get(movies::list).post(movies::create))
        .route(
            "/movies/:movie_id",
            get(movies::retrieve)
                .put(movies::replace)
                .patch(movies::patch)
                .delete(movies::delete),
        )
        // Books
        .route("/books", get(books::list).post(books::create))
        .route(
            "/books/:book_id",
            get(books::retrieve)
                .put(books::replace)
                .patch(books::patch)
                .delete(books::delete),
        )
        // Users, preferences and watch history
        .route("/users", post(users::create))
        .route("/users/:user_id", axum::routing::delete(users::delete))
        .route(
            "/users/:user_id/preferences",
            get(users::get_preferences).post(users::add_preferences),
        )
        .route(
            "/users/:user_id/watch-history",
            get(users::get_watch_history).post(users::add_watch_history),
        )
        // Bulk ingestion
        .route("/uploads", post(uploads::upload))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
