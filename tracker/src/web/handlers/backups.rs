// Backup endpoints. Snapshot and restore answer with a server-sent event
// stream that ends after the `completed` or `error` event.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};

use super::common::{error_response, ApiResponse, ApiResult, SnapshotRequest};
use crate::backup::ProgressEvent;
use crate::database::BackupCatalogRecord;
use crate::web::AppState;

fn event_stream(
    rx: UnboundedReceiver<ProgressEvent>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Event::default().json_data(&event), rx))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Start a snapshot and stream its progress
pub async fn create_backup(
    State(state): State<AppState>,
    Json(request): Json<SnapshotRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, Json<ApiResponse<()>>)>
{
    if request.initiator_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("initiator_id is required".to_string())),
        ));
    }

    info!("Snapshot requested by {}", request.initiator_id);
    let rx = state.backup_service.begin_snapshot(request.initiator_id);
    Ok(event_stream(rx))
}

/// Restore the store from a catalog entry and stream progress. The path
/// segment may be the catalog id or the blob file key.
pub async fn restore_backup(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!("Restore requested for {}", key);
    event_stream(state.backup_service.begin_restore(key))
}

pub async fn list_backups(State(state): State<AppState>) -> ApiResult<Vec<BackupCatalogRecord>> {
    match state.backup_service.list_backups().await {
        Ok(records) => Ok(Json(ApiResponse::success(records))),
        Err(e) => {
            error!("Failed to list backups: {}", e);
            Err(error_response(&e))
        }
    }
}

pub async fn delete_backup(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<BackupCatalogRecord> {
    match state.backup_service.delete_backup(&id).await {
        Ok(record) => Ok(Json(ApiResponse::success(record))),
        Err(e) => {
            error!("Failed to delete backup {}: {}", id, e);
            Err(error_response(&e))
        }
    }
}
