//! Media side-channel
//!
//! Content-addressed upload/download over pre-signed URLs. Logical
//! attachment (trace/observation field) is decoupled from physical storage
//! (bucket path keyed by the content hash): re-associating an existing blob
//! is cheap, re-uploading is not.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::constants::MEDIA_CONTENT_TYPES;
use crate::data::DataError;
use crate::data::TransactionalService;
use crate::data::blob::{BlobStorage, UploadBinding};
use crate::data::transactional::repositories::media as media_repo;
use crate::data::types::MediaRow;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("{0}")]
    Validation(String),
    #[error("Media not found or not uploaded")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] DataError),
}

/// Fields a media asset may be attached to
const ATTACHABLE_FIELDS: &[&str] = &["input", "output", "metadata"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    pub content_type: String,
    pub content_length: i64,
    /// base64 of the raw 32-byte SHA-256 digest
    pub sha256_hash: String,
    pub trace_id: String,
    pub observation_id: Option<String>,
    pub field: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub media_id: String,
    /// None when the blob is already stored; the client skips the upload
    pub upload_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub uploaded_at: DateTime<Utc>,
    pub upload_http_status: i32,
    pub upload_http_error: Option<String>,
}

pub struct MediaService {
    transactional: Arc<TransactionalService>,
    storage: Arc<dyn BlobStorage>,
    max_content_length: u64,
    upload_url_expiry: Duration,
    download_url_expiry: Duration,
}

impl MediaService {
    pub fn new(
        transactional: Arc<TransactionalService>,
        storage: Arc<dyn BlobStorage>,
        max_content_length: u64,
        upload_url_expiry: Duration,
        download_url_expiry: Duration,
    ) -> Self {
        Self {
            transactional,
            storage,
            max_content_length,
            upload_url_expiry,
            download_url_expiry,
        }
    }

    /// Validate the claimed digest and return its URL-safe hex form.
    fn decode_hash(sha256_base64: &str) -> Result<String, MediaError> {
        let digest = base64::engine::general_purpose::STANDARD
            .decode(sha256_base64)
            .map_err(|_| MediaError::Validation("sha256Hash is not valid base64".to_string()))?;
        if digest.len() != 32 {
            return Err(MediaError::Validation(
                "sha256Hash must decode to 32 bytes".to_string(),
            ));
        }
        Ok(hex::encode(digest))
    }

    /// Content-addressed object key: `{projectId}/{hash}/{type-segment}`.
    fn object_key(project_id: &str, hash_hex: &str, content_type: &str) -> String {
        format!(
            "{}/{}/{}",
            project_id,
            hash_hex,
            content_type.replace('/', "-")
        )
    }

    fn validate_request(&self, request: &UploadUrlRequest) -> Result<(), MediaError> {
        if !MEDIA_CONTENT_TYPES.contains(&request.content_type.as_str()) {
            return Err(MediaError::Validation(format!(
                "Unsupported content type: {}",
                request.content_type
            )));
        }
        if request.content_length <= 0 || request.content_length as u64 > self.max_content_length {
            return Err(MediaError::Validation(format!(
                "contentLength must be in 1..={}",
                self.max_content_length
            )));
        }
        if !ATTACHABLE_FIELDS.contains(&request.field.as_str()) {
            return Err(MediaError::Validation(format!(
                "field must be one of {:?}",
                ATTACHABLE_FIELDS
            )));
        }
        Ok(())
    }

    async fn attach(
        &self,
        project_id: &str,
        request: &UploadUrlRequest,
        media_id: &str,
    ) -> Result<(), DataError> {
        let pool = self.transactional.pool();
        match &request.observation_id {
            Some(observation_id) => {
                media_repo::attach_to_observation(
                    pool,
                    project_id,
                    &request.trace_id,
                    observation_id,
                    media_id,
                    &request.field,
                )
                .await
            }
            None => {
                media_repo::attach_to_trace(
                    pool,
                    project_id,
                    &request.trace_id,
                    media_id,
                    &request.field,
                )
                .await
            }
        }
    }

    /// Step 1 of the protocol: validate, dedupe by content identity, and
    /// hand out a pre-signed PUT unless the blob is already stored.
    pub async fn get_upload_url(
        &self,
        project_id: &str,
        request: &UploadUrlRequest,
    ) -> Result<UploadUrlResponse, MediaError> {
        self.validate_request(request)?;
        let hash_hex = Self::decode_hash(&request.sha256_hash)?;

        let pool = self.transactional.pool();
        let existing = media_repo::find_by_content(
            pool,
            project_id,
            &request.sha256_hash,
            &request.content_type,
            request.content_length,
        )
        .await?;

        if let Some(row) = &existing
            && row.is_uploaded()
        {
            // Same bytes already stored: re-associate, skip the upload.
            self.attach(project_id, request, &row.id).await?;
            return Ok(UploadUrlResponse {
                media_id: row.id.clone(),
                upload_url: None,
            });
        }

        // New content identity, or an earlier failed upload being retried:
        // (re)issue a URL binding type, length and checksum.
        let media_id = existing
            .map(|row| row.id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let bucket_path = Self::object_key(project_id, &hash_hex, &request.content_type);
        let now = Utc::now();
        let row = MediaRow {
            id: media_id.clone(),
            project_id: project_id.to_string(),
            sha256_hash: request.sha256_hash.clone(),
            content_type: request.content_type.clone(),
            content_length: request.content_length,
            bucket_name: self.storage.bucket().to_string(),
            bucket_path: bucket_path.clone(),
            upload_http_status: None,
            upload_http_error: None,
            uploaded_at: None,
            created_at: now,
            updated_at: now,
        };
        media_repo::upsert_media(pool, &row).await?;
        self.attach(project_id, request, &media_id).await?;

        let binding = UploadBinding {
            content_type: request.content_type.clone(),
            content_length: request.content_length,
            sha256_base64: request.sha256_hash.clone(),
        };
        let upload_url = self
            .storage
            .presign_put(&bucket_path, &binding, self.upload_url_expiry)
            .await?;

        Ok(UploadUrlResponse {
            media_id,
            upload_url: Some(upload_url),
        })
    }

    /// Step 3 of the protocol: record the client's upload outcome. Only a
    /// 2xx report makes the asset downloadable.
    pub async fn record_upload_result(
        &self,
        project_id: &str,
        media_id: &str,
        report: &UploadReport,
    ) -> Result<(), MediaError> {
        let updated = media_repo::record_upload_result(
            self.transactional.pool(),
            project_id,
            media_id,
            report.uploaded_at,
            report.upload_http_status,
            report.upload_http_error.as_deref(),
        )
        .await?;
        if !updated {
            return Err(MediaError::NotFound);
        }
        if !(200..300).contains(&report.upload_http_status) {
            tracing::warn!(
                media_id = %media_id,
                status = report.upload_http_status,
                error = report.upload_http_error.as_deref().unwrap_or(""),
                "Media upload failed at the object store"
            );
        }
        Ok(())
    }

    /// Pre-signed download URL; refused until the upload is confirmed.
    pub async fn get_download_url(
        &self,
        project_id: &str,
        media_id: &str,
    ) -> Result<(MediaRow, String), MediaError> {
        let row = media_repo::get_media(self.transactional.pool(), project_id, media_id)
            .await?
            .ok_or(MediaError::NotFound)?;
        if !row.is_uploaded() {
            return Err(MediaError::NotFound);
        }
        let url = self
            .storage
            .presign_get(&row.bucket_path, self.download_url_expiry)
            .await?;
        Ok((row, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn hash_of(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        base64::engine::general_purpose::STANDARD.encode(digest)
    }

    #[test]
    fn decode_hash_accepts_real_digests() {
        let hash = hash_of(b"media bytes");
        let hex = MediaService::decode_hash(&hash).unwrap();
        assert_eq!(hex.len(), 64);
    }

    #[test]
    fn decode_hash_rejects_bad_input() {
        assert!(MediaService::decode_hash("!!!not-base64!!!").is_err());
        // Valid base64 of the wrong length
        let short = base64::engine::general_purpose::STANDARD.encode(b"short");
        assert!(MediaService::decode_hash(&short).is_err());
    }

    #[test]
    fn object_key_layout() {
        let key = MediaService::object_key("p1", "abcd", "image/png");
        assert_eq!(key, "p1/abcd/image-png");
    }
}
