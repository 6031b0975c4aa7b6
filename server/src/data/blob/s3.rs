//! S3 blob storage (AWS or S3-compatible endpoints such as MinIO)

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ChecksumAlgorithm;

use crate::data::DataError;

use super::storage::{BlobStorage, UploadBinding};

#[derive(Clone)]
pub struct S3BlobStorage {
    client: Client,
    bucket: String,
}

impl S3BlobStorage {
    /// Build a client for the given bucket. A custom endpoint switches on
    /// path-style addressing, which most S3-compatible services require.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint: Option<String>,
    ) -> Result<Self, DataError> {
        let config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        let config = config_loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&config);
        if let Some(endpoint_url) = endpoint {
            s3_config = s3_config.endpoint_url(endpoint_url).force_path_style(true);
        }
        let client = Client::from_conf(s3_config.build());

        tracing::debug!(bucket = %bucket, "S3 blob storage initialized");
        Ok(Self { client, bucket })
    }

    fn presign_config(expiry: Duration) -> Result<PresigningConfig, DataError> {
        PresigningConfig::expires_in(expiry)
            .map_err(|e| DataError::blob(format!("Invalid presign expiry: {}", e)))
    }
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), DataError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| DataError::blob(format!("S3 put_object error: {}", e)))?;
        Ok(())
    }

    async fn presign_put(
        &self,
        key: &str,
        binding: &UploadBinding,
        expiry: Duration,
    ) -> Result<String, DataError> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&binding.content_type)
            .content_length(binding.content_length)
            .checksum_algorithm(ChecksumAlgorithm::Sha256)
            .checksum_sha256(&binding.sha256_base64)
            .presigned(Self::presign_config(expiry)?)
            .await
            .map_err(|e| DataError::blob(format!("S3 presign PUT error: {}", e)))?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String, DataError> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(Self::presign_config(expiry)?)
            .await
            .map_err(|e| DataError::blob(format!("S3 presign GET error: {}", e)))?;
        Ok(presigned.uri().to_string())
    }
}
