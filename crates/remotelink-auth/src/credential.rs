use crate::password::{validate_hash, verify_password, PasswordError};

/// Password protection configured for a host session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCredential {
    /// No password: every attempt is accepted
    None,
    /// Argon2id PHC hash of the session password
    Hashed(String),
}

impl SessionCredential {
    /// Build the credential from the configured hash.
    ///
    /// An empty string disables protection. A non-empty value that is not a
    /// PHC hash is rejected so a misconfigured host fails at startup instead
    /// of denying every client.
    pub fn from_config(hash: &str) -> Result<Self, PasswordError> {
        let hash = hash.trim();
        if hash.is_empty() {
            return Ok(SessionCredential::None);
        }
        validate_hash(hash)?;
        Ok(SessionCredential::Hashed(hash.to_string()))
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, SessionCredential::Hashed(_))
    }

    /// Verdict for a plaintext attempt. Internal failures deny access.
    pub fn verify(&self, attempt: &str) -> bool {
        match self {
            SessionCredential::None => true,
            SessionCredential::Hashed(hash) => match verify_password(attempt, hash) {
                Ok(valid) => valid,
                Err(e) => {
                    tracing::error!(error = %e, "Password verification failed, denying access");
                    false
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;

    #[test]
    fn test_no_credential_accepts_everything() {
        let credential = SessionCredential::from_config("").unwrap();
        assert_eq!(credential, SessionCredential::None);
        assert!(!credential.is_protected());
        assert!(credential.verify(""));
        assert!(credential.verify("whatever you like"));
    }

    #[test]
    fn test_hashed_credential_requires_exact_match() {
        let hash = hash_password("s3cret pass").unwrap();
        let credential = SessionCredential::from_config(&hash).unwrap();

        assert!(credential.is_protected());
        assert!(credential.verify("s3cret pass"));
        assert!(!credential.verify("s3cret"));
        assert!(!credential.verify(""));
    }

    #[test]
    fn test_invalid_hash_is_a_startup_error() {
        assert!(matches!(
            SessionCredential::from_config("not-a-hash"),
            Err(PasswordError::InvalidHashFormat(_))
        ));
    }

    #[test]
    fn test_corrupt_hash_fails_closed() {
        // Bypasses from_config validation to exercise the runtime error path.
        let credential = SessionCredential::Hashed("garbage".to_string());
        assert!(!credential.verify("garbage"));
    }
}
