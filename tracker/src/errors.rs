//! Custom error types for the snapshot and restore engine
//!
//! Only fatal, structural failures are modelled here. Record-level problems
//! never become errors: the orchestrator turns them into session warnings.

use std::fmt;

/// Main error type for backup operations
#[derive(Debug)]
pub enum BackupError {
    /// Configuration-related errors
    Config(ConfigError),

    /// Snapshot artifact could not be used
    Artifact(ArtifactError),

    /// Restore aborted, nothing was committed
    Restore(RestoreError),

    /// Blob storage communication errors
    Storage(StorageError),

    /// Backup catalog lookups and writes
    Catalog { reason: String },

    /// Another snapshot or restore is running
    Busy { operation: String },

    /// Other errors with context
    Other(String),
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

/// Snapshot artifact error variants
#[derive(Debug)]
pub enum ArtifactError {
    /// The document has no `metadata` section
    MissingMetadata,

    /// Artifact written by a newer engine
    UnsupportedVersion { found: u32, supported: u32 },

    /// Decompression or JSON decoding failed
    Decode { reason: String },
}

/// Restore error variants
#[derive(Debug)]
pub enum RestoreError {
    /// Tables still had rows after the forced cleanup pass
    CleanupIncomplete { tables: Vec<String> },

    /// The restore transaction exceeded its timeout and was rolled back
    TransactionTimeout { minutes: u64 },
}

/// Blob storage error variants
#[derive(Debug)]
pub enum StorageError {
    UploadFailed { file_name: String, reason: String },
    DownloadFailed { key: String, reason: String },
    NotFound { key: String },
    DeleteFailed { key: String, reason: String },
}

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(e) => write!(f, "Configuration error: {}", e),
            BackupError::Artifact(e) => write!(f, "Artifact error: {}", e),
            BackupError::Restore(e) => write!(f, "Restore error: {}", e),
            BackupError::Storage(e) => write!(f, "Storage error: {}", e),
            BackupError::Catalog { reason } => write!(f, "Catalog error: {}", reason),
            BackupError::Busy { operation } => {
                write!(f, "Another operation is in progress: {}", operation)
            }
            BackupError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::MissingMetadata => {
                write!(f, "Snapshot artifact has no metadata section")
            }
            ArtifactError::UnsupportedVersion { found, supported } => {
                write!(
                    f,
                    "Snapshot format version {} is newer than supported version {}",
                    found, supported
                )
            }
            ArtifactError::Decode { reason } => {
                write!(f, "Failed to decode snapshot artifact: {}", reason)
            }
        }
    }
}

impl fmt::Display for RestoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreError::CleanupIncomplete { tables } => {
                write!(
                    f,
                    "Cleanup could not empty the store, tables still populated: {}",
                    tables.join(", ")
                )
            }
            RestoreError::TransactionTimeout { minutes } => {
                write!(
                    f,
                    "Restore transaction exceeded {} minutes and was rolled back",
                    minutes
                )
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::UploadFailed { file_name, reason } => {
                write!(f, "Upload of {} failed: {}", file_name, reason)
            }
            StorageError::DownloadFailed { key, reason } => {
                write!(f, "Download of {} failed: {}", key, reason)
            }
            StorageError::NotFound { key } => write!(f, "Blob {} not found", key),
            StorageError::DeleteFailed { key, reason } => {
                write!(f, "Delete of {} failed: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for BackupError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ArtifactError {}
impl std::error::Error for RestoreError {}
impl std::error::Error for StorageError {}

impl From<anyhow::Error> for BackupError {
    fn from(err: anyhow::Error) -> Self {
        BackupError::Other(err.to_string())
    }
}

impl From<ConfigError> for BackupError {
    fn from(err: ConfigError) -> Self {
        BackupError::Config(err)
    }
}

impl From<ArtifactError> for BackupError {
    fn from(err: ArtifactError) -> Self {
        BackupError::Artifact(err)
    }
}

impl From<RestoreError> for BackupError {
    fn from(err: RestoreError) -> Self {
        BackupError::Restore(err)
    }
}

impl From<StorageError> for BackupError {
    fn from(err: StorageError) -> Self {
        BackupError::Storage(err)
    }
}
