// Operation tracking and management endpoints

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::common::{ApiResponse, ApiResult, EmergencyCleanupQuery};
use crate::operation_tracker::OperationStatus;
use crate::web::AppState;

/// Get all active operations
pub async fn get_active_operations(State(state): State<AppState>) -> ApiResult<OperationStatus> {
    let operations = state.operation_tracker.get_operation_status().await;
    Ok(Json(ApiResponse::success(operations)))
}

/// Emergency cleanup of stuck operations
pub async fn emergency_cleanup_operations(
    Query(query): Query<EmergencyCleanupQuery>,
    State(state): State<AppState>,
) -> ApiResult<Value> {
    info!(
        "Emergency cleanup requested for operations older than {} hours",
        query.max_hours
    );

    let cleaned_count = state
        .operation_tracker
        .cleanup_old_operations(query.max_hours)
        .await;

    Ok(Json(ApiResponse::success(json!({
        "message": format!("Emergency cleanup completed: {} operations removed", cleaned_count),
        "cleaned_count": cleaned_count
    }))))
}
