//! Error types for fraud-client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Maximum length of a response body carried in an error message
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication required - please log in again")]
    AuthRequired,

    #[error("Request failed with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Keychain error: {0}")]
    KeychainError(String),

    #[error("Invalid storage passphrase")]
    InvalidPassphrase,

    #[error("Encryption failed: {0}")]
    EncryptionError(String),

    #[error("Decryption failed: {0}")]
    DecryptionError(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl ClientError {
    /// Build an `HttpStatus` error, truncating the body so it stays loggable
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let body = if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
        };
        ClientError::HttpStatus { status, body }
    }

    /// The caller must go back to an unauthenticated state
    pub fn is_auth_required(&self) -> bool {
        matches!(self, ClientError::AuthRequired)
    }

    /// The credential store could not be read or written
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            ClientError::StorageError(_)
                | ClientError::KeychainError(_)
                | ClientError::InvalidPassphrase
                | ClientError::DecryptionError(_)
                | ClientError::IoError(_)
        )
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_short_body() {
        let err = ClientError::from_status(422, b"{\"message\":\"invalid url\"}");
        assert_eq!(err.status(), Some(422));
        assert!(err.to_string().contains("invalid url"));
    }

    #[test]
    fn test_from_status_truncates_long_body() {
        let body = "x".repeat(2000);
        match ClientError::from_status(500, body.as_bytes()) {
            ClientError::HttpStatus { body, .. } => {
                assert!(body.starts_with(&"x".repeat(500)));
                assert!(body.contains("2000 total bytes"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_classification() {
        assert!(ClientError::AuthRequired.is_auth_required());
        assert!(ClientError::StorageError("locked".into()).is_storage());
        assert!(ClientError::InvalidPassphrase.is_storage());
        assert!(!ClientError::Network("reset".into()).is_storage());
        assert_eq!(ClientError::AuthRequired.status(), None);
    }
}
