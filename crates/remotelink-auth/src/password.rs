//! Argon2id hashing for session passwords

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

/// Error types for password operations
#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Failed to hash session password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify session password: {0}")]
    VerificationFailed(String),

    #[error("Invalid session password hash: {0}")]
    InvalidHashFormat(String),
}

/// Hash a session password into a PHC string (`$argon2id$v=19$...`).
///
/// The salt is random, so hashing the same password twice gives different
/// strings that both verify.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
}

/// Check that `hash` is a parseable PHC string
pub fn validate_hash(hash: &str) -> Result<(), PasswordError> {
    PasswordHash::new(hash)
        .map(|_| ())
        .map_err(|e| PasswordError::InvalidHashFormat(e.to_string()))
}

/// Verify a plaintext attempt against a stored hash.
///
/// * `Ok(true)` - attempt matches
/// * `Ok(false)` - attempt does not match
/// * `Err(_)` - the hash is malformed or verification itself failed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHashFormat(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}
