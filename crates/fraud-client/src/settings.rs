//! Client settings management
//!
//! Stores non-sensitive configuration (API base URL, storage namespace,
//! backend choice) in a plain JSON file. Tokens never go here.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, Result};

const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_NAMESPACE: &str = "com.fraudfishing.app";

/// Which backend holds the credential pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Keychain,
    EncryptedFile,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "keychain" => Ok(StorageBackend::Keychain),
            "file" | "encrypted-file" => Ok(StorageBackend::EncryptedFile),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(ClientError::ConfigError(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }
}

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Settings file version
    pub version: u32,
    /// Backend base URL, e.g. `https://api.example.com`
    pub base_url: String,
    /// Namespace scoping the stored credentials
    pub namespace: String,
    /// Per-request timeout in seconds (0 = no timeout)
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            version: 1,
            base_url: DEFAULT_BASE_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            request_timeout_secs: 30,
            storage: StorageBackend::default(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Parsed base URL with a trailing slash, so relative paths join under it
    pub fn base_url(&self) -> Result<url::Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = url::Url::parse(&raw)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "Unsupported scheme: {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.namespace.trim().is_empty() {
            return Err(ClientError::ConfigError(
                "Namespace must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: ClientSettings,
}

impl SettingsManager {
    /// Load settings from `dir`, falling back to defaults when the file is missing
    pub fn new(dir: &Path) -> Result<Self> {
        let settings_file = dir.join(SETTINGS_FILE);
        let settings = Self::load_from_file(&settings_file)?;

        Ok(Self {
            settings_file,
            settings,
        })
    }

    /// Platform config directory
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "fraud-fishing", "fraud-fishing")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| {
                ClientError::ConfigError("Could not determine config directory".to_string())
            })
    }

    fn load_from_file(path: &Path) -> Result<ClientSettings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(ClientSettings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: ClientSettings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        self.settings.validate()?;

        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(&self.settings)?;

        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    pub fn get(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut ClientSettings {
        &mut self.settings
    }

    /// Replace settings and save
    pub async fn update(&mut self, settings: ClientSettings) -> Result<()> {
        self.settings = settings;
        self.save().await
    }

    pub fn settings_file(&self) -> &Path {
        &self.settings_file
    }
}
