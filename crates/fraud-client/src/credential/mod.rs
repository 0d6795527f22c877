//! Typed access to the stored credential pair

mod store;

pub use store::{CredentialStore, TokenKey};
