use anyhow::Result;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use super::BlobStorage;
use crate::errors::StorageError;

const KEY_PREFIX: &str = "backups";

/// Artifacts stored as plain files under `<root>/backups/<uuid>/`
pub struct LocalBlobStorage {
    root: PathBuf,
}

impl LocalBlobStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        let key = format!("{}/{}/{}", KEY_PREFIX, Uuid::new_v4(), file_name);
        let path = self.path_for(&key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::UploadFailed {
                    file_name: file_name.to_string(),
                    reason: e.to_string(),
                })?;
        }

        fs::write(&path, &bytes)
            .await
            .map_err(|e| StorageError::UploadFailed {
                file_name: file_name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Stored {} ({} bytes) at {:?}", key, bytes.len(), path);
        Ok(key)
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from {:?}", bytes.len(), path);
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into()),
            Err(e) => Err(StorageError::DownloadFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {:?}", path);
                if let Some(parent) = path.parent() {
                    // only succeeds once the per-upload directory is empty
                    if let Err(e) = fs::remove_dir(parent).await {
                        debug!("Kept directory {:?}: {}", parent, e);
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into()),
            Err(e) => Err(StorageError::DeleteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path());

        let key = storage
            .upload(b"artifact".to_vec(), "backup_20260101_000000.json.gz")
            .await
            .unwrap();
        assert!(key.starts_with("backups/"));
        assert!(key.ends_with("/backup_20260101_000000.json.gz"));
        assert_eq!(storage.download(&key).await.unwrap(), b"artifact");

        storage.delete(&key).await.unwrap();
        let err = storage.download(&key).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_prunes_only_empty_upload_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path());

        let kept_key = storage
            .upload(b"one".to_vec(), "backup_20260101_000000.json.gz")
            .await
            .unwrap();
        let kept_dir = dir.path().join(&kept_key).parent().unwrap().to_path_buf();
        std::fs::write(kept_dir.join("notes.txt"), b"unrelated").unwrap();

        storage.delete(&kept_key).await.unwrap();
        assert!(kept_dir.join("notes.txt").exists());

        let pruned_key = storage
            .upload(b"two".to_vec(), "backup_20260102_000000.json.gz")
            .await
            .unwrap();
        let pruned_dir = dir.path().join(&pruned_key).parent().unwrap().to_path_buf();

        storage.delete(&pruned_key).await.unwrap();
        assert!(!pruned_dir.exists());
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalBlobStorage::new(dir.path());
        assert!(storage.download("../etc/passwd").await.is_err());
        assert!(storage.download("/etc/passwd").await.is_err());
    }
}
