//! Blob storage for snapshot artifacts.
//!
//! Only the backup service talks to storage. Two backends are available:
//! a local directory and an HTTP object store.

pub mod http;
pub mod local;

pub use http::HttpBlobStorage;
pub use local::LocalBlobStorage;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StorageBackend, StorageConfig};
use crate::errors::ConfigError;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store `bytes` under a name derived from `file_name`, returning its key
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String>;

    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn BlobStorage>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalBlobStorage::new(&config.local_root))),
        StorageBackend::Http => {
            let base_url = config
                .http_base_url
                .clone()
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "storage.http_base_url".to_string(),
                    reason: "required when storage.backend = \"http\"".to_string(),
                })?;
            Ok(Arc::new(HttpBlobStorage::new(
                base_url,
                config.http_api_key.clone(),
                Duration::from_secs(config.http_timeout_seconds),
            )?))
        }
    }
}
