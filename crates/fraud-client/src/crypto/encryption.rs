//! AES-256-GCM sealing of stored entries
//!
//! Sealed format: `v1.{nonce_b64}.{ciphertext_and_tag_b64}`
//!
//! The entry name is bound as associated data, so a sealed value copied
//! under a different name fails authentication.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use rand::RngCore;

use super::StorageKey;
use crate::error::{ClientError, Result};

const FORMAT_VERSION: &str = "v1";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Seal `plaintext` under `key`, binding `context` as associated data
pub fn seal(plaintext: &[u8], context: &str, key: &StorageKey) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ClientError::EncryptionError(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    // aes-gcm appends the tag to the ciphertext
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: context.as_bytes(),
            },
        )
        .map_err(|e| ClientError::EncryptionError(e.to_string()))?;

    Ok(format!(
        "{}.{}.{}",
        FORMAT_VERSION,
        STANDARD_NO_PAD.encode(nonce_bytes),
        STANDARD_NO_PAD.encode(sealed)
    ))
}

/// Open a value produced by [`seal`] with the same key and context
pub fn open(sealed: &str, context: &str, key: &StorageKey) -> Result<Vec<u8>> {
    let mut parts = sealed.splitn(3, '.');
    let (version, nonce_b64, body_b64) = match (parts.next(), parts.next(), parts.next()) {
        (Some(v), Some(n), Some(b)) => (v, n, b),
        _ => {
            return Err(ClientError::DecryptionError(
                "Invalid sealed format: expected version.nonce.ciphertext".to_string(),
            ))
        }
    };

    if version != FORMAT_VERSION {
        return Err(ClientError::DecryptionError(format!(
            "Unsupported sealed version: {}",
            version
        )));
    }

    let nonce_bytes = STANDARD_NO_PAD
        .decode(nonce_b64)
        .map_err(|e| ClientError::DecryptionError(format!("Invalid nonce: {}", e)))?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(ClientError::DecryptionError(format!(
            "Invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let body = STANDARD_NO_PAD
        .decode(body_b64)
        .map_err(|e| ClientError::DecryptionError(format!("Invalid ciphertext: {}", e)))?;
    if body.len() < TAG_LEN {
        return Err(ClientError::DecryptionError(
            "Ciphertext too short".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ClientError::DecryptionError(e.to_string()))?;

    cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &body,
                aad: context.as_bytes(),
            },
        )
        .map_err(|e| ClientError::DecryptionError(e.to_string()))
}

/// Open a sealed value and interpret it as UTF-8
pub fn open_string(sealed: &str, context: &str, key: &StorageKey) -> Result<String> {
    let plaintext = open(sealed, context, key)?;
    String::from_utf8(plaintext)
        .map_err(|e| ClientError::DecryptionError(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(byte: u8) -> StorageKey {
        StorageKey::new([byte; 32])
    }

    #[test]
    fn test_seal_open() {
        let key = test_key(1);
        let sealed = seal(b"eyJhbGciOi.access", "app/access_token", &key).unwrap();

        assert!(sealed.starts_with("v1."));
        let opened = open_string(&sealed, "app/access_token", &key).unwrap();
        assert_eq!(opened, "eyJhbGciOi.access");
    }

    #[test]
    fn test_nonces_differ() {
        let key = test_key(1);
        let a = seal(b"same", "ctx", &key).unwrap();
        let b = seal(b"same", "ctx", &key).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let sealed = seal(b"secret", "ctx", &test_key(1)).unwrap();
        assert!(open(&sealed, "ctx", &test_key(2)).is_err());
    }

    #[test]
    fn test_moved_entry_rejected() {
        let key = test_key(1);
        let sealed = seal(b"R1", "app/refresh_token", &key).unwrap();
        assert!(open(&sealed, "app/access_token", &key).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = test_key(1);
        let sealed = seal(b"secret data", "ctx", &key).unwrap();

        let (prefix, body) = sealed.rsplit_once('.').unwrap();
        let mut bytes = STANDARD_NO_PAD.decode(body).unwrap();
        bytes[0] ^= 0xFF;
        let tampered = format!("{}.{}", prefix, STANDARD_NO_PAD.encode(bytes));

        assert!(open(&tampered, "ctx", &key).is_err());
    }

    #[test]
    fn test_invalid_format() {
        let key = test_key(1);
        assert!(open("garbage", "ctx", &key).is_err());
        assert!(open("v2.AAAA.AAAA", "ctx", &key).is_err());
        assert!(open("v1.!!!.AAAA", "ctx", &key).is_err());
        assert!(open("v1.AAAAAAAAAAAAAAAA.AA", "ctx", &key).is_err());
    }
}
