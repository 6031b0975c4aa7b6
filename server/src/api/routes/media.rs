//! Media side-channel endpoints

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use std::sync::Arc;

use crate::api::auth::ProjectScoped;
use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::domain::media::{
    MediaError, MediaService, UploadReport, UploadUrlRequest, UploadUrlResponse,
};

fn media_service(state: &AppState) -> Result<Arc<MediaService>, ApiError> {
    state.media.clone().ok_or_else(|| {
        ApiError::bad_request("MEDIA_DISABLED", "No media bucket is configured")
    })
}

fn map_media_error(e: MediaError) -> ApiError {
    match e {
        MediaError::Validation(message) => ApiError::bad_request("INVALID_MEDIA_REQUEST", message),
        MediaError::NotFound => {
            ApiError::not_found("MEDIA_NOT_FOUND", "Media not found or not uploaded")
        }
        MediaError::Storage(e) => ApiError::from_data(e),
    }
}

pub async fn get_upload_url(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Json(request): Json<UploadUrlRequest>,
) -> Result<(StatusCode, Json<UploadUrlResponse>), ApiError> {
    let media = media_service(&state)?;
    let response = media
        .get_upload_url(&auth.project_id, &request)
        .await
        .map_err(map_media_error)?;
    let status = if response.upload_url.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

pub async fn report_upload(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(media_id): Path<String>,
    Json(report): Json<UploadReport>,
) -> Result<StatusCode, ApiError> {
    let media = media_service(&state)?;
    media
        .record_upload_result(&auth.project_id, &media_id, &report)
        .await
        .map_err(map_media_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaResponse {
    pub media_id: String,
    pub content_type: String,
    pub content_length: i64,
    pub sha_256_hash: String,
    pub uploaded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub url: String,
}

pub async fn get_media(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(media_id): Path<String>,
) -> Result<Json<MediaResponse>, ApiError> {
    let media = media_service(&state)?;
    let (row, url) = media
        .get_download_url(&auth.project_id, &media_id)
        .await
        .map_err(map_media_error)?;
    Ok(Json(MediaResponse {
        media_id: row.id,
        content_type: row.content_type,
        content_length: row.content_length,
        sha_256_hash: row.sha256_hash,
        uploaded_at: row.uploaded_at,
        url,
    }))
}
