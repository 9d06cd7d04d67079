use axum::{extract::rejection::JsonRejection, extract::FromRequest};

use crate::error::AppError;

/// `Json` extractor whose rejections come back as `ValidationError` bodies
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}
