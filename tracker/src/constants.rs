//! Central repository for timeouts, limits and progress bands used by the
//! snapshot and restore engine.
//!
//! Constants are grouped by concern so the configuration defaults and the
//! engine agree on a single source of truth.

use std::time::Duration;

/// Snapshot generation constants
pub mod snapshot {
    use super::Duration;

    /// Records fetched per page for collections marked as paged
    pub const PAGE_SIZE: u32 = 1000;

    /// Pause between two pages of the same collection
    pub const PAGE_PAUSE: Duration = Duration::from_millis(50);

    /// Version written into every artifact's metadata
    pub const FORMAT_VERSION: u32 = 1;

    /// gzip level used for artifacts (0-9)
    pub const COMPRESSION_LEVEL: u32 = 6;

    /// Prefix and extension of artifact file names
    pub const FILE_PREFIX: &str = "backup_";
    pub const FILE_EXTENSION: &str = "json.gz";
}

/// Restore constants
pub mod restore {
    /// Transaction timeout for the whole cleanup/recreate/validate sequence
    pub const TRANSACTION_TIMEOUT_MINUTES: u64 = 30;

    /// Elapsed time after which the watchdog logs a warning
    pub const WATCHDOG_WARN_MINUTES: u64 = 10;

    /// Maximum identities bound into one `IN (...)` lookup
    pub const ID_LOOKUP_CHUNK: usize = 500;

    /// Records restored between two progress events within one collection
    pub const PROGRESS_EVERY_RECORDS: u32 = 250;
}

/// Percentage bands of the caller-visible progress stream
pub mod progress {
    /// Snapshot: data fetch ends here, compression starts
    pub const SNAPSHOT_FETCH_END: u8 = 60;
    pub const SNAPSHOT_COMPRESS_END: u8 = 70;
    pub const SNAPSHOT_UPLOAD_END: u8 = 90;

    /// Restore: downloading, verifying, restoring, finalizing
    pub const RESTORE_DOWNLOAD_END: u8 = 30;
    pub const RESTORE_VERIFY_END: u8 = 50;
    pub const RESTORE_APPLY_END: u8 = 90;

    pub const DONE: u8 = 100;
}

/// Operation tracking constants
pub mod operations {
    /// Tracker target shared by snapshot and restore, they never overlap
    pub const STORE_TARGET: &str = "operational-store";

    pub const SNAPSHOT: &str = "snapshot";
    pub const RESTORE: &str = "restore";

    /// Hours after which stuck operations are cleaned up
    pub const OPERATION_CLEANUP_HOURS: i64 = 24;

    /// Cleanup interval in seconds
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 3600;
}

/// Default configuration values
pub mod defaults {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8095;
    pub const DATABASE_PATH: &str = "data/tracker.db";
    pub const LOCAL_STORAGE_ROOT: &str = "data/backups";
    pub const HTTP_STORAGE_TIMEOUT_SECONDS: u64 = 300;
    pub const MAX_DB_CONNECTIONS: u32 = 8;
    pub const DB_ACQUIRE_TIMEOUT_SECONDS: u64 = 120;
}
