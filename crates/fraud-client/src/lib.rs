//! # fraud-client
//!
//! Client core for the Fraud Fishing API including:
//! - Bearer-authenticated requests with one refresh-and-retry on 401/403
//! - Single-flight access credential refresh shared by concurrent callers
//! - OS keychain storage with an encrypted file fallback
//! - Credential secrets zeroized on drop

pub mod client;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod http;
pub mod session;
pub mod settings;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::FraudClient;
pub use credential::{CredentialStore, TokenKey};
pub use crypto::Secret;
pub use error::{ClientError, Result};
pub use http::{
    ApiRequest, ApiResponse, AuthApi, HttpTransport, LoginResponse, ReqwestTransport,
    RequestExecutor, UserProfile,
};
pub use session::{CredentialSession, RefreshTransport, SessionState};
pub use settings::{ClientSettings, SettingsManager, StorageBackend};
pub use storage::{
    open_backend, EncryptedFileStorage, KeychainStorage, MemoryStorage, SecureStorage,
};
