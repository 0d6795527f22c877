//! Encrypted file storage backend
//!
//! Stores sealed entries in a JSON file under the application data directory.
//! Each entry is individually sealed with AES-256-GCM, using its name as
//! associated data. The key is derived from a passphrase with Argon2id.

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::SecureStorage;
use crate::crypto::{
    derive_key, generate_salt, open, open_string, seal, KeyDerivationParams, StorageKey,
};
use crate::error::{ClientError, Result};

const ENTRIES_FILE: &str = "credentials.json";
const SALT_FILE: &str = "salt";
const VERIFY_FILE: &str = "verify";

/// Known plaintext sealed into the verification file
const VERIFY_PLAINTEXT: &str = "fraud-fishing-verification";
const VERIFY_CONTEXT: &str = "__verify__";

const FILE_VERSION: u32 = 1;

/// File format for persistent storage
#[derive(Debug, Serialize, Deserialize)]
struct StorageFile {
    version: u32,
    entries: HashMap<String, String>,
}

/// Encrypted file storage backend
pub struct EncryptedFileStorage {
    storage_dir: PathBuf,
    /// Map of key -> sealed value, mirrors the file on disk
    entries: RwLock<HashMap<String, String>>,
    key: StorageKey,
}

impl EncryptedFileStorage {
    /// Open (or create) the store in `storage_dir` with the default key derivation cost
    pub async fn open(storage_dir: PathBuf, passphrase: &str) -> Result<Self> {
        Self::open_with_params(storage_dir, passphrase, &KeyDerivationParams::default()).await
    }

    /// Open (or create) the store, rejecting a passphrase that does not match
    /// the one the store was created with
    pub async fn open_with_params(
        storage_dir: PathBuf,
        passphrase: &str,
        params: &KeyDerivationParams,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&storage_dir).await?;

        let salt = match read_optional(&storage_dir.join(SALT_FILE)).await? {
            Some(salt) => salt.trim().to_string(),
            None => {
                let salt = generate_salt();
                write_atomic(&storage_dir.join(SALT_FILE), &salt).await?;
                debug!("Generated new storage salt in {:?}", storage_dir);
                salt
            }
        };

        let key = derive_key(passphrase, &salt, params)?;

        let verify_path = storage_dir.join(VERIFY_FILE);
        match read_optional(&verify_path).await? {
            Some(sealed) => match open_string(sealed.trim(), VERIFY_CONTEXT, &key) {
                Ok(plaintext) if plaintext == VERIFY_PLAINTEXT => {}
                _ => return Err(ClientError::InvalidPassphrase),
            },
            None => {
                let sealed = seal(VERIFY_PLAINTEXT.as_bytes(), VERIFY_CONTEXT, &key)?;
                write_atomic(&verify_path, &sealed).await?;
                info!("Initialized encrypted credential store at {:?}", storage_dir);
            }
        }

        let entries = match read_optional(&storage_dir.join(ENTRIES_FILE)).await? {
            Some(contents) => {
                let file: StorageFile = serde_json::from_str(&contents)?;
                if file.version != FILE_VERSION {
                    return Err(ClientError::StorageError(format!(
                        "Unsupported storage file version: {}",
                        file.version
                    )));
                }
                file.entries
            }
            None => HashMap::new(),
        };

        debug!("Loaded {} sealed entries from {:?}", entries.len(), storage_dir);

        Ok(Self {
            storage_dir,
            entries: RwLock::new(entries),
            key,
        })
    }

    /// Platform data directory for the store
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "fraud-fishing", "fraud-fishing")
            .map(|dirs| dirs.data_dir().join("credentials"))
            .ok_or_else(|| {
                ClientError::StorageError("Could not determine data directory".to_string())
            })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Write `entries` to disk; the caller holds the write lock
    async fn persist(&self, entries: &HashMap<String, String>) -> Result<()> {
        let file = StorageFile {
            version: FILE_VERSION,
            entries: entries.clone(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        write_atomic(&self.storage_dir.join(ENTRIES_FILE), &contents).await?;
        debug!("Saved {} sealed entries", entries.len());
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write via a temp file and rename so readers never see a partial file
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, contents).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

#[async_trait]
impl SecureStorage for EncryptedFileStorage {
    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let sealed = seal(value, key, &self.key)?;

        let mut entries = self.entries.write().await;
        let mut updated = entries.clone();
        updated.insert(key.to_string(), sealed);

        // Only publish the new map once it is on disk
        self.persist(&updated).await?;
        *entries = updated;

        debug!("Stored key: {}", key);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;

        match entries.get(key) {
            Some(sealed) => {
                let plaintext = open(sealed, key, &self.key)?;
                debug!("Retrieved key: {}", key);
                Ok(Some(plaintext))
            }
            None => {
                debug!("Key not found: {}", key);
                Ok(None)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;

        if entries.contains_key(key) {
            let mut updated = entries.clone();
            updated.remove(key);
            self.persist(&updated).await?;
            *entries = updated;
            debug!("Deleted key: {}", key);
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "Encrypted File Storage"
    }
}
