pub mod manager;
use serde::{Deserialize, Serialize};
use std::time::Duration;
pub use manager::ConfigManager;

use crate::constants::{defaults, restore, snapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backup: BackupSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_local_root")]
    pub local_root: String,
    pub http_base_url: Option<String>,
    pub http_api_key: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_root: default_local_root(),
            http_base_url: None,
            http_api_key: None,
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

/// Tuning knobs for snapshot generation and restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_page_pause_ms")]
    pub page_pause_ms: u64,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default = "default_restore_timeout")]
    pub restore_timeout_minutes: u64,
    #[serde(default = "default_watchdog_warn")]
    pub watchdog_warn_minutes: u64,
    #[serde(default = "default_progress_every")]
    pub progress_every_records: u32,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_pause_ms: default_page_pause_ms(),
            compression_level: default_compression_level(),
            restore_timeout_minutes: default_restore_timeout(),
            watchdog_warn_minutes: default_watchdog_warn(),
            progress_every_records: default_progress_every(),
        }
    }
}

impl BackupSettings {
    pub fn page_pause(&self) -> Duration {
        Duration::from_millis(self.page_pause_ms)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_timeout_minutes * 60)
    }

    pub fn watchdog_threshold(&self) -> Duration {
        Duration::from_secs(self.watchdog_warn_minutes * 60)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_database_path(),
            storage: StorageConfig::default(),
            backup: BackupSettings::default(),
        }
    }
}

fn default_host() -> String {
    defaults::HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

fn default_local_root() -> String {
    defaults::LOCAL_STORAGE_ROOT.to_string()
}

fn default_http_timeout() -> u64 {
    defaults::HTTP_STORAGE_TIMEOUT_SECONDS
}

fn default_page_size() -> u32 {
    snapshot::PAGE_SIZE
}

fn default_page_pause_ms() -> u64 {
    snapshot::PAGE_PAUSE.as_millis() as u64
}

fn default_compression_level() -> u32 {
    snapshot::COMPRESSION_LEVEL
}

fn default_restore_timeout() -> u64 {
    restore::TRANSACTION_TIMEOUT_MINUTES
}

fn default_watchdog_warn() -> u64 {
    restore::WATCHDOG_WARN_MINUTES
}

fn default_progress_every() -> u32 {
    restore::PROGRESS_EVERY_RECORDS
}
