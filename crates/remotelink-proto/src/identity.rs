//! Host identities and session tokens

use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{AUTO_HOST_ID, EFFECTIVE_HOST_ID_PREFIX, HOST_ID_BYTES};

/// Identity under which a host is reachable through the relay.
///
/// The relay is authoritative: the identity proposed in `REGISTER_HOST` may be
/// replaced by the one returned in `HOST_REGISTERED`, and a new registration
/// after a reconnect may yield a different value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostIdentity(String);

impl HostIdentity {
    /// Resolve a configured hint into the initial identity.
    ///
    /// An empty hint or `auto` (any case) produces a random identity, anything
    /// else is used verbatim.
    pub fn resolve_hint(hint: &str) -> Self {
        if hint.is_empty() || hint.eq_ignore_ascii_case(AUTO_HOST_ID) {
            let id = generate_random_host_id(HOST_ID_BYTES);
            tracing::info!(host_id = %id, "Auto-generated initial host ID");
            Self(id)
        } else {
            tracing::info!(host_id = %hint, "Using provided initial host ID");
            Self(hint.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for HostIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for HostIdentity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Relay-generated token scoped to a single tunnel attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First six characters, used to correlate log lines
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(6) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Generate a random hex identity from `byte_len` bytes of OS randomness.
///
/// The result has exactly `2 * byte_len` characters. If the OS RNG fails a
/// time-derived fallback (`randfail` + 8 digits) is returned instead.
pub fn generate_random_host_id(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read OS randomness for host ID, using timestamp fallback");
            fallback_host_id()
        }
    }
}

fn fallback_host_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("randfail{:08}", nanos % 100_000_000)
}

/// Line announcing the effective identity to the launching process
pub fn identity_line(id: &HostIdentity) -> String {
    format!("{}{}\n", EFFECTIVE_HOST_ID_PREFIX, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_host_id_length() {
        assert_eq!(generate_random_host_id(4).len(), 8);
        assert_eq!(generate_random_host_id(8).len(), 16);
        assert_eq!(generate_random_host_id(0).len(), 0);
    }

    #[test]
    fn test_random_host_id_is_lowercase_hex() {
        let id = generate_random_host_id(16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_random_host_ids_are_independent() {
        let a = generate_random_host_id(16);
        let b = generate_random_host_id(16);
        assert_ne!(a, b, "128-bit identities should not collide");
    }

    #[test]
    fn test_fallback_host_id_not_empty() {
        let id = fallback_host_id();
        assert!(id.starts_with("randfail"));
        assert_eq!(id.len(), "randfail".len() + 8);
    }

    #[test]
    fn test_resolve_hint() {
        assert_eq!(HostIdentity::resolve_hint("my-desk").as_str(), "my-desk");
        assert_eq!(HostIdentity::resolve_hint("auto").as_str().len(), 8);
        assert_eq!(HostIdentity::resolve_hint("AUTO").as_str().len(), 8);
        assert_eq!(HostIdentity::resolve_hint("").as_str().len(), 8);
    }

    #[test]
    fn test_session_token_short() {
        assert_eq!(SessionToken::from("abcdef123456").short(), "abcdef");
        assert_eq!(SessionToken::from("abc").short(), "abc");
        assert_eq!(SessionToken::from("").short(), "");
    }

    #[test]
    fn test_identity_line() {
        let line = identity_line(&HostIdentity::from("deadbeef"));
        assert_eq!(line, "EFFECTIVE_HOST_ID:deadbeef\n");
    }
}
