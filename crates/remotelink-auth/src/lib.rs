//! Session password handling for relay-mode hosts
//!
//! Hosts store only an Argon2id hash of the session password. When the relay
//! forwards a client's plaintext attempt, [`SessionCredential::verify`] turns
//! it into a yes/no verdict that is always sent back, so every failure path
//! resolves to "invalid".

pub mod credential;
pub mod password;

pub use credential::SessionCredential;
pub use password::{hash_password, validate_hash, verify_password, PasswordError};
