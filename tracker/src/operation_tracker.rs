//! Operation tracking for long-running snapshot and restore runs
//!
//! Snapshot and restore both register against the same target (the
//! operational store), so at most one of them runs at a time. A second
//! request is rejected immediately instead of queueing behind the first.
//!
//! # Usage
//!
//! ```ignore
//! tracker.try_start_operation("operational-store", "restore", None).await?;
//!
//! // Perform restore...
//!
//! tracker.finish_operation("operational-store").await;
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub operation_type: String,
    pub target_name: String,
    pub started_at: DateTime<Utc>,
    pub user_info: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationStatus {
    pub busy_targets: HashMap<String, ActiveOperation>,
    pub total_active: usize,
}

#[derive(Clone, Default)]
pub struct SimpleOperationTracker {
    active_operations: Arc<RwLock<HashMap<String, ActiveOperation>>>, // target_name -> operation
}

impl SimpleOperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation on a target, failing if the target is busy
    #[instrument(skip(self), fields(target = %target_name, operation = %operation_type))]
    pub async fn try_start_operation(
        &self,
        target_name: &str,
        operation_type: &str,
        user_info: Option<String>,
    ) -> Result<()> {
        let mut active = self.active_operations.write().await;

        if let Some(current_op) = active.get(target_name) {
            let duration = Utc::now().signed_duration_since(current_op.started_at);
            let duration_str = if duration.num_hours() > 0 {
                format!("{}h {}m", duration.num_hours(), duration.num_minutes() % 60)
            } else if duration.num_minutes() > 0 {
                format!("{}m", duration.num_minutes())
            } else {
                format!("{}s", duration.num_seconds())
            };

            return Err(anyhow::anyhow!(
                "{} is busy with '{}' (started {} ago)",
                target_name,
                current_op.operation_type,
                duration_str
            ));
        }

        active.insert(
            target_name.to_string(),
            ActiveOperation {
                operation_type: operation_type.to_string(),
                target_name: target_name.to_string(),
                started_at: Utc::now(),
                user_info,
            },
        );
        info!("Started '{}' on {}", operation_type, target_name);
        Ok(())
    }

    #[instrument(skip(self), fields(target = %target_name))]
    pub async fn finish_operation(&self, target_name: &str) {
        let mut active = self.active_operations.write().await;
        if let Some(op) = active.remove(target_name) {
            let duration = Utc::now().signed_duration_since(op.started_at);
            info!(
                "Finished '{}' on {} (took {}s)",
                op.operation_type,
                target_name,
                duration.num_seconds()
            );
        }
    }

    pub async fn get_operation_status(&self) -> OperationStatus {
        let active = self.active_operations.read().await;
        OperationStatus {
            busy_targets: active.clone(),
            total_active: active.len(),
        }
    }

    pub async fn is_busy(&self, target_name: &str) -> bool {
        self.active_operations.read().await.contains_key(target_name)
    }

    pub async fn get_active_operation(&self, target_name: &str) -> Option<ActiveOperation> {
        self.active_operations.read().await.get(target_name).cloned()
    }

    /// Drop registrations older than `max_hours` left behind by a crashed run
    pub async fn cleanup_old_operations(&self, max_hours: i64) -> u32 {
        let mut active = self.active_operations.write().await;
        let cutoff = Utc::now() - chrono::Duration::hours(max_hours);
        let initial_count = active.len();

        active.retain(|target_name, operation| {
            let keep = operation.started_at > cutoff;
            if !keep {
                warn!(
                    "Cleaned up stuck '{}' on {} (registered {}h ago)",
                    operation.operation_type,
                    target_name,
                    Utc::now()
                        .signed_duration_since(operation.started_at)
                        .num_hours()
                );
            }
            keep
        });

        let cleaned_count = initial_count - active.len();
        if cleaned_count > 0 {
            warn!(
                "Emergency cleanup: removed {} operations older than {}h",
                cleaned_count, max_hours
            );
        }
        cleaned_count as u32
    }
}
