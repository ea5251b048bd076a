use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::{error::ApiError, utils::validate_upload, AppState};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Accept one evidence file in the multipart field `file` and return its public URL.
pub async fn upload_evidence(
    State(app_state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut file_data: Option<Bytes> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() == Some("file") {
            content_type = field.content_type().map(|s| s.to_string());
            file_data = Some(field.bytes().await.map_err(|e| {
                ApiError::Validation(format!("Failed to read file data: {}", e))
            })?);
        }
    }

    let file_data =
        file_data.ok_or_else(|| ApiError::Validation("No file provided".to_string()))?;
    let content_type = content_type
        .ok_or_else(|| ApiError::Validation("File content type is required".to_string()))?;

    let settings = &app_state.config;
    let (mime_type, kind) = validate_upload(
        &content_type,
        &file_data,
        &settings.upload_allowed_types,
        settings.max_image_bytes,
        settings.max_video_bytes,
    )?;

    let stored = app_state.storage.store(&file_data, &mime_type).await?;
    let url = format!(
        "{}/api/uploads/{}",
        settings.public_base_url.trim_end_matches('/'),
        stored.name
    );

    tracing::info!(
        file = %stored.name,
        kind = ?kind,
        size = stored.size,
        "evidence upload accepted"
    );

    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}

/// Serve a previously uploaded evidence file inline.
pub async fn serve_upload(
    State(app_state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let evidence = app_state
        .storage
        .load(&file)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&evidence.mime_type)
            .map_err(|e| ApiError::internal(format!("Invalid stored content type: {}", e)))?,
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(evidence.data.len()));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=3600"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::CONTENT_DISPOSITION, HeaderValue::from_static("inline"));

    tracing::debug!(file = %file, content_type = %evidence.mime_type, "serving evidence file");

    Ok((headers, evidence.data).into_response())
}
