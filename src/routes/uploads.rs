use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::AppState;
use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    services::MediaType,
};

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub message: &'static str,
    pub job_id: Uuid,
}

/// Accepts a CSV or JSON movie file and queues it for ingestion.
///
/// The media type comes from the `file` part's content type and is checked
/// before anything is saved.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadAccepted>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let declared = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let media_type = MediaType::from_declared(&declared)?;
        let file_name = field.file_name().unwrap_or("upload").to_string();

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("failed to read uploaded file: {}", e)))?;
        if data.is_empty() {
            return Err(AppError::Validation("uploaded file is empty".to_string()));
        }

        let job_id = state.ingestion.submit(&data, media_type).await?;
        tracing::info!(
            request_id = %request_id,
            job_id = %job_id,
            file_name = %file_name,
            bytes = data.len(),
            "Upload accepted for ingestion"
        );

        return Ok((
            StatusCode::ACCEPTED,
            Json(UploadAccepted {
                message: "Your file is being processed.",
                job_id,
            }),
        ));
    }

    Err(AppError::Validation(format!(
        "multipart field '{}' is required",
        FILE_FIELD
    )))
}
