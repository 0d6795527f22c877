//! Passphrase-based storage key derivation using Argon2id

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

use super::StorageKey;
use crate::error::{ClientError, Result};

/// Parameters for Argon2id key derivation
#[derive(Debug, Clone)]
pub struct KeyDerivationParams {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            memory_cost: 19456, // 19 MiB, OWASP minimum for Argon2id
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KeyDerivationParams {
    /// Cheap parameters for tests and ephemeral stores
    pub fn light() -> Self {
        Self {
            memory_cost: 8,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Generate a random salt in the PHC base64 form
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Derive the 256-bit storage key from a passphrase and salt
pub fn derive_key(
    passphrase: &str,
    salt: &str,
    params: &KeyDerivationParams,
) -> Result<StorageKey> {
    if passphrase.is_empty() {
        return Err(ClientError::KeyDerivationError(
            "Passphrase must not be empty".to_string(),
        ));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| ClientError::KeyDerivationError(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let salt = SaltString::from_b64(salt)
        .map_err(|e| ClientError::KeyDerivationError(format!("Invalid salt: {}", e)))?;

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| ClientError::KeyDerivationError(e.to_string()))?
        .hash
        .ok_or_else(|| ClientError::KeyDerivationError("No hash output".to_string()))?;

    let key: [u8; 32] = hash
        .as_bytes()
        .try_into()
        .map_err(|_| ClientError::KeyDerivationError("Unexpected hash length".to_string()))?;

    Ok(StorageKey::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_key() {
        let salt = generate_salt();
        let params = KeyDerivationParams::light();

        let a = derive_key("hunter2", &salt, &params).unwrap();
        let b = derive_key("hunter2", &salt, &params).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_different_passphrase_or_salt() {
        let salt = generate_salt();
        let params = KeyDerivationParams::light();

        let base = derive_key("hunter2", &salt, &params).unwrap();
        let other_pass = derive_key("hunter3", &salt, &params).unwrap();
        let other_salt = derive_key("hunter2", &generate_salt(), &params).unwrap();

        assert_ne!(base.as_bytes(), other_pass.as_bytes());
        assert_ne!(base.as_bytes(), other_salt.as_bytes());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let salt = generate_salt();
        assert!(derive_key("", &salt, &KeyDerivationParams::light()).is_err());
    }

    #[test]
    fn test_invalid_salt_rejected() {
        assert!(derive_key("hunter2", "!", &KeyDerivationParams::light()).is_err());
    }
}
