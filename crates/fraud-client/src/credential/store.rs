//! Namespaced store for the access and refresh credentials

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::Secret;
use crate::error::{ClientError, Result};
use crate::storage::SecureStorage;

/// Storage name of the signed-in user's profile. Not a secret, but it
/// lives and dies with the pair.
const PROFILE_KEY: &str = "current_user";

/// The two secrets making up a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    Access,
    Refresh,
}

impl TokenKey {
    pub const ALL: [TokenKey; 2] = [TokenKey::Access, TokenKey::Refresh];

    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKey::Access => "access_token",
            TokenKey::Refresh => "refresh_token",
        }
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential store
///
/// Keys are scoped as `{namespace}/{access_token|refresh_token}` so several
/// applications can share one backend.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
    namespace: String,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SecureStorage>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend_name(&self) -> &'static str {
        self.storage.backend_name()
    }

    fn storage_key(&self, key: TokenKey) -> String {
        format!("{}/{}", self.namespace, key.as_str())
    }

    /// Save a credential, replacing any previous value as a whole
    pub async fn save(&self, key: TokenKey, value: &Secret) -> Result<()> {
        self.storage
            .store(&self.storage_key(key), value.expose().as_bytes())
            .await?;
        debug!("Saved {} in namespace {}", key, self.namespace);
        Ok(())
    }

    /// Read a credential, `None` when it has never been written or was deleted
    pub async fn get(&self, key: TokenKey) -> Result<Option<Secret>> {
        match self.storage.retrieve(&self.storage_key(key)).await? {
            Some(bytes) => {
                let value = String::from_utf8(bytes).map_err(|e| {
                    ClientError::StorageError(format!("Stored {} is not UTF-8: {}", key, e))
                })?;
                Ok(Some(Secret::new(value)))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: TokenKey) -> Result<()> {
        self.storage.delete(&self.storage_key(key)).await?;
        debug!("Deleted {} in namespace {}", key, self.namespace);
        Ok(())
    }

    fn profile_key(&self) -> String {
        format!("{}/{}", self.namespace, PROFILE_KEY)
    }

    /// Save the signed-in user's profile as JSON
    pub async fn save_profile<T: Serialize + ?Sized>(&self, profile: &T) -> Result<()> {
        let bytes = serde_json::to_vec(profile)?;
        self.storage.store(&self.profile_key(), &bytes).await?;
        debug!("Saved profile in namespace {}", self.namespace);
        Ok(())
    }

    pub async fn get_profile<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.storage.retrieve(&self.profile_key()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_profile(&self) -> Result<()> {
        self.storage.delete(&self.profile_key()).await
    }

    /// Delete both credentials and the profile. Every deletion is
    /// attempted; the first failure is returned.
    pub async fn clear_all(&self) -> Result<()> {
        let mut first_error = None;

        for key in TokenKey::ALL {
            if let Err(e) = self.delete(key).await {
                warn!("Failed to delete {}: {}", key, e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.delete_profile().await {
            warn!("Failed to delete profile: {}", e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn test_store() -> (CredentialStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (CredentialStore::new(storage.clone(), "com.test.app"), storage)
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let (store, _) = test_store();

        store.save(TokenKey::Access, &Secret::new("A1")).await.unwrap();
        store.save(TokenKey::Access, &Secret::new("A2")).await.unwrap();

        assert_eq!(
            store.get(TokenKey::Access).await.unwrap(),
            Some(Secret::new("A2"))
        );
        assert_eq!(store.get(TokenKey::Refresh).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_are_namespaced() {
        let storage = Arc::new(MemoryStorage::new());
        let app_a = CredentialStore::new(storage.clone(), "app-a");
        let app_b = CredentialStore::new(storage.clone(), "app-b");

        app_a.save(TokenKey::Access, &Secret::new("A-token")).await.unwrap();

        assert!(storage.exists("app-a/access_token").await.unwrap());
        assert_eq!(app_b.get(TokenKey::Access).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_all_is_idempotent() {
        let (store, storage) = test_store();

        store.save(TokenKey::Access, &Secret::new("A1")).await.unwrap();
        store.save(TokenKey::Refresh, &Secret::new("R1")).await.unwrap();

        store.clear_all().await.unwrap();
        assert!(storage.is_empty().await);

        store.clear_all().await.unwrap();
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_profile_is_cleared_with_pair() {
        let (store, storage) = test_store();

        store.save(TokenKey::Access, &Secret::new("A1")).await.unwrap();
        store
            .save_profile(&serde_json::json!({ "id": 7, "name": "Ana" }))
            .await
            .unwrap();
        assert!(storage.exists("com.test.app/current_user").await.unwrap());

        let profile: serde_json::Value = store.get_profile().await.unwrap().unwrap();
        assert_eq!(profile["id"], 7);

        store.clear_all().await.unwrap();
        assert!(storage.is_empty().await);
        assert_eq!(store.get_profile::<serde_json::Value>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let (store, _) = test_store();
        store.delete(TokenKey::Refresh).await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let (store, storage) = test_store();
        storage.set_unavailable(true);

        let err = store.get(TokenKey::Access).await.unwrap_err();
        assert!(err.is_storage());
        assert!(store.clear_all().await.is_err());
    }
}
