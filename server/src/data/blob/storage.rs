//! Blob storage trait
//!
//! One instance per bucket. The media protocol never proxies bytes through
//! the server: clients upload and download via pre-signed URLs that bind
//! content type, length and checksum.

use async_trait::async_trait;
use std::time::Duration;

use crate::data::DataError;

/// Parameters a pre-signed PUT must bind so the object store can enforce
/// integrity at upload time.
#[derive(Debug, Clone)]
pub struct UploadBinding {
    pub content_type: String,
    pub content_length: i64,
    /// base64 of the raw 32-byte SHA-256 digest
    pub sha256_base64: String,
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// The bucket this instance writes to.
    fn bucket(&self) -> &str;

    /// Server-side write (event log, dead letters).
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), DataError>;

    /// Pre-signed PUT URL for a client upload. The store rejects uploads
    /// whose checksum, length or type differ from the binding.
    async fn presign_put(
        &self,
        key: &str,
        binding: &UploadBinding,
        expiry: Duration,
    ) -> Result<String, DataError>;

    /// Short-lived pre-signed GET URL.
    async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String, DataError>;
}
