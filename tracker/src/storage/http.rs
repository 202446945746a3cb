use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::BlobStorage;
use crate::errors::StorageError;

/// Object store reached over plain HTTP: `PUT`/`GET`/`DELETE {base}/{key}`
pub struct HttpBlobStorage {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBlobStorage {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStorage for HttpBlobStorage {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        let key = format!("backups/{}/{}", Uuid::new_v4(), file_name);
        let size = bytes.len();
        let upload_failed = |reason: String| StorageError::UploadFailed {
            file_name: file_name.to_string(),
            reason,
        };

        let response = self
            .authorize(self.client.put(self.url_for(&key)))
            .header("Content-Type", "application/gzip")
            .body(bytes)
            .send()
            .await
            .map_err(|e| upload_failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(upload_failed(format!("status {}: {}", status, error_text)).into());
        }

        info!("Uploaded {} ({} bytes) to {}", key, size, self.base_url);
        Ok(key)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let download_failed = |reason: String| StorageError::DownloadFailed {
            key: key.to_string(),
            reason,
        };

        let response = self
            .authorize(self.client.get(self.url_for(key)))
            .send()
            .await
            .map_err(|e| download_failed(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into()),
            status if !status.is_success() => {
                let error_text = response.text().await.unwrap_or_default();
                Err(download_failed(format!("status {}: {}", status, error_text)).into())
            }
            _ => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| download_failed(e.to_string()))?;
                debug!("Downloaded {} ({} bytes)", key, bytes.len());
                Ok(bytes.to_vec())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.url_for(key)))
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into()),
            status if !status.is_success() => Err(StorageError::DeleteFailed {
                key: key.to_string(),
                reason: format!("status {}", status),
            }
            .into()),
            _ => {
                info!("Deleted {} from {}", key, self.base_url);
                Ok(())
            }
        }
    }
}
