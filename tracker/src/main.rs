use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tracker::constants::operations;
use tracker::web::{start_web_server, AppState};
use tracker::{storage, BackupService, ConfigManager, Database, SimpleOperationTracker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("tracker=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Process Tracker backup service");

    // Load configuration
    let config_manager = ConfigManager::new("config".to_string()).await?;
    let config = config_manager.get_current_config();
    info!(
        "Configuration loaded: listening on {}:{}, {:?} blob storage",
        config.host, config.port, config.storage.backend
    );

    // Initialize database
    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized");

    let blob_storage = storage::from_config(&config.storage)?;
    info!("Blob storage initialized");

    // Initialize operation tracker
    let operation_tracker = Arc::new(SimpleOperationTracker::new());
    info!("Operation tracker initialized");

    let backup_service = Arc::new(BackupService::new(
        database.clone(),
        blob_storage,
        operation_tracker.clone(),
        config.backup.clone(),
    ));
    info!("BackupService initialized");

    // Start periodic operation cleanup
    let operation_tracker_clone = operation_tracker.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            operations::CLEANUP_INTERVAL_SECONDS,
        ));
        loop {
            interval.tick().await;
            let cleaned = operation_tracker_clone
                .cleanup_old_operations(operations::OPERATION_CLEANUP_HOURS)
                .await;
            if cleaned > 0 {
                warn!(
                    "Cleaned up {} stuck operations older than {} hours",
                    cleaned,
                    operations::OPERATION_CLEANUP_HOURS
                );
            }
        }
    });

    // Start web server
    let state = AppState::new(config, backup_service, operation_tracker);
    start_web_server(state).await?;

    Ok(())
}
