//! In-memory blob storage for tests
//!
//! Pre-signed URLs are synthetic; the store records what was bound so tests
//! can assert on the binding.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::data::DataError;

use super::storage::{BlobStorage, UploadBinding};

#[derive(Default)]
pub struct MemoryBlobStorage {
    bucket: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    bindings: Mutex<HashMap<String, UploadBinding>>,
}

impl MemoryBlobStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn binding(&self, key: &str) -> Option<UploadBinding> {
        self.bindings.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), DataError> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn presign_put(
        &self,
        key: &str,
        binding: &UploadBinding,
        expiry: Duration,
    ) -> Result<String, DataError> {
        self.bindings
            .lock()
            .unwrap()
            .insert(key.to_string(), binding.clone());
        Ok(format!(
            "https://{}.example/{}?X-Amz-Expires={}&upload=1",
            self.bucket,
            key,
            expiry.as_secs()
        ))
    }

    async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String, DataError> {
        Ok(format!(
            "https://{}.example/{}?X-Amz-Expires={}",
            self.bucket,
            key,
            expiry.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_and_read_back() {
        let storage = MemoryBlobStorage::new("test-bucket");
        storage
            .put("a/b.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(storage.object("a/b.json"), Some(b"{}".to_vec()));
        assert_eq!(storage.object_count(), 1);
    }

    #[tokio::test]
    async fn presign_records_binding() {
        let storage = MemoryBlobStorage::new("test-bucket");
        let binding = UploadBinding {
            content_type: "image/png".into(),
            content_length: 42,
            sha256_base64: "abc=".into(),
        };
        let url = storage
            .presign_put("k", &binding, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.contains("test-bucket"));
        assert_eq!(storage.binding("k").unwrap().content_length, 42);
    }
}
