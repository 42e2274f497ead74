//! Persistent settings

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

/// Where [`AppConfig`] values live between runs
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Values stored so far. A store with nothing saved yields
    /// [`AppConfig::empty`]; unreadable or malformed contents are errors.
    async fn load(&self) -> Result<AppConfig, ConfigError>;

    /// Replace the stored values
    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    fn path(&self) -> PathBuf;

    fn exists(&self) -> bool;

    /// Write [`AppConfig::defaults`], refusing to overwrite existing values
    async fn init(&self) -> Result<(), ConfigError> {
        if self.exists() {
            return Err(ConfigError::AlreadyExists(
                self.path().display().to_string(),
            ));
        }
        self.save(&AppConfig::defaults()).await
    }
}
