//! Storage trait definitions

use crate::error::Result;
use async_trait::async_trait;

/// Trait for secure storage backends
///
/// Values are written as a whole; a reader never observes a partial write.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Store a value with the given key, replacing any previous value
    async fn store(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a value by key, `None` when absent
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a value by key; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Check if this storage backend is hardware-backed
    fn is_hardware_backed(&self) -> bool;

    /// Get a human-readable name for this storage backend
    fn backend_name(&self) -> &'static str;
}
