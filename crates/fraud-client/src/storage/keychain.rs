//! OS Keychain storage backend
//!
//! Uses the system keychain for secure storage:
//! - macOS / iOS: Keychain
//! - Windows: Credential Manager (DPAPI)
//! - Linux: Secret Service (GNOME Keyring, KWallet)

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use super::SecureStorage;
use crate::error::{ClientError, Result};

/// Account used to check keychain availability
const CHECK_ACCOUNT: &str = "__fraud_fishing_check__";

/// OS Keychain storage backend
pub struct KeychainStorage {
    /// Keychain service name, one per application
    service: String,
    /// Whether keychain is available
    available: bool,
}

impl KeychainStorage {
    /// Create a keychain backend for the given service name
    pub fn new(service: &str) -> Self {
        let available = Self::test_availability(service);

        if available {
            debug!("Keychain storage is available for service {}", service);
        } else {
            warn!("Keychain storage is not available for service {}", service);
        }

        Self {
            service: service.to_string(),
            available,
        }
    }

    /// Write and remove a throwaway entry
    fn test_availability(service: &str) -> bool {
        match Entry::new(service, CHECK_ACCOUNT) {
            Ok(entry) => {
                if entry.set_password("check").is_ok() {
                    let _ = entry.delete_password();
                    true
                } else {
                    false
                }
            }
            Err(_) => false,
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        if !self.available {
            return Err(ClientError::KeychainError(
                "Keychain not available".to_string(),
            ));
        }
        Entry::new(&self.service, key).map_err(|e| ClientError::KeychainError(e.to_string()))
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}

#[async_trait]
impl SecureStorage for KeychainStorage {
    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let entry = self.entry(key)?;

        // The keychain stores strings; tokens are always UTF-8
        let value = std::str::from_utf8(value)
            .map_err(|e| ClientError::StorageError(format!("Value is not UTF-8: {}", e)))?;

        entry
            .set_password(value)
            .map_err(|e| ClientError::KeychainError(e.to_string()))?;

        debug!("Stored key in keychain: {}", key);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entry = self.entry(key)?;

        match entry.get_password() {
            Ok(value) => {
                debug!("Retrieved key from keychain: {}", key);
                Ok(Some(value.into_bytes()))
            }
            Err(keyring::Error::NoEntry) => {
                debug!("Key not found in keychain: {}", key);
                Ok(None)
            }
            Err(e) => Err(ClientError::KeychainError(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let entry = self.entry(key)?;

        match entry.delete_password() {
            Ok(()) => {
                debug!("Deleted key from keychain: {}", key);
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(ClientError::KeychainError(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entry = self.entry(key)?;

        match entry.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(ClientError::KeychainError(e.to_string())),
        }
    }

    fn is_hardware_backed(&self) -> bool {
        // OS keychains are protected by the platform (Secure Enclave, DPAPI, ...)
        self.available
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        return "Apple Keychain";

        #[cfg(target_os = "windows")]
        return "Windows Credential Manager";

        #[cfg(target_os = "linux")]
        return "Linux Secret Service";

        #[cfg(not(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "windows",
            target_os = "linux"
        )))]
        return "System Keychain";
    }
}
