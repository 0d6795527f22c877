//! Storage backends for secure credential persistence
//!
//! 1. OS Keychain (hardware-backed where available)
//! 2. Encrypted file (fallback)
//! 3. In-memory (ephemeral sessions and tests)

mod encrypted_file;
mod keychain;
mod memory;
mod traits;

pub use encrypted_file::EncryptedFileStorage;
pub use keychain::KeychainStorage;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ClientError, Result};
use crate::settings::StorageBackend;

/// Open the configured storage backend.
///
/// The keychain falls back to the encrypted file backend when the platform
/// keychain is unavailable; the file backend needs a passphrase.
pub async fn open_backend(
    backend: StorageBackend,
    keychain_service: &str,
    file_dir: Option<PathBuf>,
    passphrase: Option<&str>,
) -> Result<Arc<dyn SecureStorage>> {
    let storage: Arc<dyn SecureStorage> = match backend {
        StorageBackend::Keychain => {
            let keychain = KeychainStorage::new(keychain_service);
            if keychain.is_available() {
                Arc::new(keychain)
            } else {
                warn!("Keychain unavailable, falling back to encrypted file storage");
                Arc::new(open_encrypted_file(file_dir, passphrase).await?)
            }
        }
        StorageBackend::EncryptedFile => Arc::new(open_encrypted_file(file_dir, passphrase).await?),
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
    };

    info!("Using credential storage: {}", storage.backend_name());
    Ok(storage)
}

async fn open_encrypted_file(
    file_dir: Option<PathBuf>,
    passphrase: Option<&str>,
) -> Result<EncryptedFileStorage> {
    let passphrase = passphrase.ok_or_else(|| {
        ClientError::ConfigError(
            "A passphrase is required for the encrypted file store".to_string(),
        )
    })?;
    let dir = match file_dir {
        Some(dir) => dir,
        None => EncryptedFileStorage::default_dir()?,
    };
    EncryptedFileStorage::open(dir, passphrase).await
}
