//! Blob storage doubles for failure paths

use anyhow::Result;
use async_trait::async_trait;

use tracker::errors::StorageError;
use tracker::BlobStorage;

/// Rejects every upload, serves nothing
pub struct FailingBlobStorage;

#[async_trait]
impl BlobStorage for FailingBlobStorage {
    async fn upload(&self, _bytes: Vec<u8>, file_name: &str) -> Result<String> {
        Err(StorageError::UploadFailed {
            file_name: file_name.to_string(),
            reason: "storage offline".to_string(),
        }
        .into())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        Err(StorageError::NotFound {
            key: key.to_string(),
        }
        .into())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Err(StorageError::NotFound {
            key: key.to_string(),
        }
        .into())
    }
}
