pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::config::Config;
use crate::operation_tracker::SimpleOperationTracker;
use crate::services::BackupService;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backup_service: Arc<BackupService>,
    pub operation_tracker: Arc<SimpleOperationTracker>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        backup_service: Arc<BackupService>,
        operation_tracker: Arc<SimpleOperationTracker>,
    ) -> Self {
        Self {
            config,
            backup_service,
            operation_tracker,
        }
    }
}
