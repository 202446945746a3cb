use super::{Config, StorageBackend};
use crate::errors::ConfigError;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            current_config: Arc::new(config),
        }
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);

        if !Path::new(&main_config_path).exists() {
            warn!(
                "No configuration found at {}, using built-in defaults",
                main_config_path
            );
            return Ok(Config::default());
        }

        debug!("Loading main config: {}", main_config_path);
        let main_config_content =
            fs::read_to_string(&main_config_path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: main_config_path.clone(),
                    reason: e.to_string(),
                })?;

        let config: Config =
            toml::from_str(&main_config_content).map_err(|e| ConfigError::ParseError {
                reason: e.to_string(),
            })?;

        Self::validate(&config)?;

        info!(
            "Loaded configuration: database {}, {:?} storage, page size {}, restore timeout {}m",
            config.database_path,
            config.storage.backend,
            config.backup.page_size,
            config.backup.restore_timeout_minutes
        );

        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.backup.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.page_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if config.backup.compression_level > 9 {
            return Err(ConfigError::InvalidValue {
                field: "backup.compression_level".to_string(),
                reason: format!("{} is outside 0-9", config.backup.compression_level),
            });
        }

        if config.backup.restore_timeout_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.restore_timeout_minutes".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if config.backup.watchdog_warn_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.watchdog_warn_minutes".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if config.backup.progress_every_records == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.progress_every_records".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if config.storage.backend == StorageBackend::Http
            && config
                .storage
                .http_base_url
                .as_deref()
                .map(str::is_empty)
                .unwrap_or(true)
        {
            return Err(ConfigError::InvalidValue {
                field: "storage.http_base_url".to_string(),
                reason: "required when storage.backend = \"http\"".to_string(),
            });
        }

        Ok(())
    }
}
