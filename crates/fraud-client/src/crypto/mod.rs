//! Cryptographic primitives for the encrypted credential store
//!
//! - AES-256-GCM sealing with the entry name as associated data
//! - Argon2id key derivation from a passphrase
//! - Zeroize-on-drop wrappers for keys and tokens

mod encryption;
mod key_derivation;
mod secure_memory;

pub use encryption::{open, open_string, seal};
pub use key_derivation::{derive_key, generate_salt, KeyDerivationParams};
pub use secure_memory::{Secret, StorageKey};
