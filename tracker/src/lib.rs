pub mod backup;
pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod operation_tracker;
pub mod services;
pub mod storage;
pub mod web;

// Re-export commonly used types
pub use backup::{ProgressEvent, ProgressStatus, RestoreSummary, SnapshotArtifact};
pub use config::{Config, ConfigManager};
pub use database::Database;
pub use operation_tracker::SimpleOperationTracker;
pub use services::BackupService;
pub use storage::BlobStorage;
