//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, request timeout, which token store to use, and the last used
//! username.
//!
//! Configuration is stored at `~/.config/chroniccare/config.json`.
//! `CHRONICCARE_API_URL` overrides the stored base URL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
use crate::auth::{EncryptedFileStore, KeyringTokenStore, TokenStore, store::DEFAULT_SERVICE};

/// Application name used for config/data directory paths
const APP_NAME: &str = "chroniccare";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Encrypted session file name, for the file store backend
const SESSION_FILE: &str = "session.bin";

pub const API_URL_ENV: &str = "CHRONICCARE_API_URL";
pub const PASSPHRASE_ENV: &str = "CHRONICCARE_STORE_PASSPHRASE";

/// Where session tokens are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// OS keychain
    #[default]
    Keyring,
    /// Passphrase-encrypted file in the data directory
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub store_backend: StoreBackend,
    pub keyring_service: String,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            store_backend: StoreBackend::default(),
            keyring_service: DEFAULT_SERVICE.to_string(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env();
        debug!(api_base_url = %config.api_base_url, backend = ?config.store_backend, "Config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the configured token store. The file backend needs a passphrase.
    pub fn open_store(&self, passphrase: Option<&str>) -> Result<Arc<dyn TokenStore>> {
        match self.store_backend {
            StoreBackend::Keyring => Ok(Arc::new(KeyringTokenStore::with_service(
                self.keyring_service.clone(),
            ))),
            StoreBackend::File => {
                let passphrase = passphrase.filter(|p| !p.is_empty()).ok_or_else(|| {
                    anyhow::anyhow!("The file token store needs a passphrase (set {})", PASSPHRASE_ENV)
                })?;
                let path = self.data_dir()?.join(SESSION_FILE);
                Ok(Arc::new(EncryptedFileStore::new(path, passphrase)))
            }
        }
    }
}
