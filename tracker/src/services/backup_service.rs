//! Snapshot and restore entry points with progress streaming.
//!
//! The service wraps generator output with compression, upload and the
//! catalog entry, and on restore performs the inverse before handing the
//! artifact to the orchestrator. It is the only component that talks to blob
//! storage or the catalog.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::backup::{
    codec, ArtifactSummary, ProgressEmitter, ProgressEvent, RestoreOrchestrator, RestoreSummary,
    SnapshotGenerator,
};
use crate::config::BackupSettings;
use crate::constants::{operations, progress};
use crate::database::{BackupCatalogRecord, Database};
use crate::errors::{BackupError, StorageError};
use crate::operation_tracker::SimpleOperationTracker;
use crate::storage::BlobStorage;

#[derive(Clone)]
pub struct BackupService {
    database: Arc<Database>,
    storage: Arc<dyn BlobStorage>,
    operation_tracker: Arc<SimpleOperationTracker>,
    generator: SnapshotGenerator,
    orchestrator: RestoreOrchestrator,
    settings: BackupSettings,
}

impl BackupService {
    pub fn new(
        database: Arc<Database>,
        storage: Arc<dyn BlobStorage>,
        operation_tracker: Arc<SimpleOperationTracker>,
        settings: BackupSettings,
    ) -> Self {
        Self {
            generator: SnapshotGenerator::new(database.clone(), settings.clone()),
            orchestrator: RestoreOrchestrator::new(database.clone(), settings.clone()),
            database,
            storage,
            operation_tracker,
            settings,
        }
    }

    /// Start a snapshot in the background and return its event stream
    pub fn begin_snapshot(&self, initiator_id: String) -> UnboundedReceiver<ProgressEvent> {
        let (emitter, rx) = ProgressEmitter::channel();
        let service = self.clone();
        tokio::spawn(async move {
            service.run_snapshot(&initiator_id, &emitter).await;
        });
        rx
    }

    /// Start a restore in the background and return its event stream
    pub fn begin_restore(&self, catalog_key: String) -> UnboundedReceiver<ProgressEvent> {
        let (emitter, rx) = ProgressEmitter::channel();
        let service = self.clone();
        tokio::spawn(async move {
            service.run_restore(&catalog_key, &emitter).await;
        });
        rx
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupCatalogRecord>> {
        self.database.list_catalog_records().await
    }

    /// Remove the blob, then its catalog entry
    pub async fn delete_backup(&self, id: &str) -> Result<BackupCatalogRecord> {
        let record = self
            .database
            .find_catalog_record(id)
            .await?
            .ok_or_else(|| BackupError::Catalog {
                reason: format!("No backup found for '{}'", id),
            })?;

        if let Err(e) = self.storage.delete(&record.file_key).await {
            match e.downcast_ref::<StorageError>() {
                Some(StorageError::NotFound { .. }) => {
                    warn!("Blob {} already gone, removing catalog entry", record.file_key)
                }
                _ => return Err(e),
            }
        }

        self.database.delete_catalog_record(&record.id).await?;
        info!("Deleted backup {} ({})", record.id, record.file_name);
        Ok(record)
    }

    #[instrument(skip(self, emitter))]
    pub async fn run_snapshot(&self, initiator_id: &str, emitter: &ProgressEmitter) {
        if let Err(e) = self
            .operation_tracker
            .try_start_operation(
                operations::STORE_TARGET,
                operations::SNAPSHOT,
                Some(initiator_id.to_string()),
            )
            .await
        {
            warn!("Snapshot rejected: {}", e);
            emitter.error(
                BackupError::Busy {
                    operation: e.to_string(),
                }
                .to_string(),
            );
            return;
        }

        emitter.started(format!("Snapshot requested by {}", initiator_id));
        let result = self.create_snapshot(initiator_id, emitter).await;
        self.operation_tracker
            .finish_operation(operations::STORE_TARGET)
            .await;

        match result {
            Ok(summary) => {
                info!(
                    "Snapshot {} stored as {} ({} records)",
                    summary.id, summary.file_key, summary.total_records
                );
                let message = format!("Snapshot {} created", summary.file_name);
                emitter.snapshot_completed(message, summary);
            }
            Err(e) => {
                error!("Snapshot failed: {:#}", e);
                emitter.error(format!("Snapshot failed: {:#}", e));
            }
        }
    }

    async fn create_snapshot(
        &self,
        initiator_id: &str,
        emitter: &ProgressEmitter,
    ) -> Result<ArtifactSummary> {
        let artifact = self
            .generator
            .generate(&emitter.span(0, progress::SNAPSHOT_FETCH_END))
            .await?;
        let metadata = artifact.metadata.clone();
        let file_name = artifact.file_name();

        emitter.progress(
            progress::SNAPSHOT_FETCH_END,
            format!("Compressing {} records", artifact.total_records()),
        );
        let bytes = codec::encode(Arc::new(artifact), self.settings.compression_level).await?;
        let size = bytes.len() as i64;

        emitter.progress(
            progress::SNAPSHOT_COMPRESS_END,
            format!("Uploading {} ({} bytes)", file_name, size),
        );
        let file_key = self.storage.upload(bytes, &file_name).await?;

        emitter.progress(progress::SNAPSHOT_UPLOAD_END, "Recording backup in catalog");
        let record = BackupCatalogRecord {
            id: Uuid::new_v4().to_string(),
            file_name,
            file_key,
            size,
            created_by: initiator_id.to_string(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.database.insert_catalog_record(&record).await {
            if let Err(delete_err) = self.storage.delete(&record.file_key).await {
                warn!(
                    "Could not remove orphaned blob {}: {}",
                    record.file_key, delete_err
                );
            }
            return Err(e.context("Failed to record backup in catalog"));
        }

        Ok(ArtifactSummary::new(&record, &metadata))
    }

    #[instrument(skip(self, emitter))]
    pub async fn run_restore(&self, catalog_key: &str, emitter: &ProgressEmitter) {
        if let Err(e) = self
            .operation_tracker
            .try_start_operation(operations::STORE_TARGET, operations::RESTORE, None)
            .await
        {
            warn!("Restore rejected: {}", e);
            emitter.error(
                BackupError::Busy {
                    operation: e.to_string(),
                }
                .to_string(),
            );
            return;
        }

        emitter.started(format!("Restore of {} requested", catalog_key));
        let result = self.restore_backup(catalog_key, emitter).await;
        self.operation_tracker
            .finish_operation(operations::STORE_TARGET)
            .await;

        match result {
            Ok(summary) => {
                let message = if summary.warnings.is_empty() {
                    format!("Restore finished: {} records", summary.total_restored)
                } else {
                    format!(
                        "Restore finished with {} warnings: {} records",
                        summary.warnings.len(),
                        summary.total_restored
                    )
                };
                emitter.restore_completed(message, summary);
            }
            Err(e) => {
                error!("Restore failed: {:#}", e);
                emitter.error(format!("Restore failed: {:#}", e));
            }
        }
    }

    async fn restore_backup(
        &self,
        catalog_key: &str,
        emitter: &ProgressEmitter,
    ) -> Result<RestoreSummary> {
        let record = self
            .database
            .find_catalog_record(catalog_key)
            .await?
            .ok_or_else(|| BackupError::Catalog {
                reason: format!("No backup found for '{}'", catalog_key),
            })?;

        emitter.progress(0, format!("Downloading {}", record.file_name));
        let bytes = self
            .storage
            .download(&record.file_key)
            .await
            .with_context(|| format!("Failed to download {}", record.file_key))?;

        emitter.progress(
            progress::RESTORE_DOWNLOAD_END,
            format!("Verifying {} ({} bytes)", record.file_name, bytes.len()),
        );
        let artifact = codec::decode(bytes).await?;
        info!(
            "Artifact {} verified: format v{}, captured at {}, {} records",
            record.file_name,
            artifact.metadata.version,
            artifact.metadata.captured_at,
            artifact.total_records()
        );

        emitter.progress(progress::RESTORE_VERIFY_END, "Restoring data");
        let summary = self
            .orchestrator
            .restore(
                Arc::new(artifact),
                emitter.span(progress::RESTORE_VERIFY_END, progress::RESTORE_APPLY_END),
            )
            .await?;

        emitter.progress(progress::RESTORE_APPLY_END, "Finalizing restore");
        Ok(summary)
    }
}
