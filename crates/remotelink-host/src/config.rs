//! Host configuration

use std::time::Duration;

use remotelink_proto::{
    validate_address, AddressError, AUTO_HOST_ID, CONTROL_CONNECT_TIMEOUT, DATA_CONNECT_TIMEOUT,
    DEFAULT_DIRECT_PORT, LOCAL_SERVICE_CONNECT_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("Host ID must not contain whitespace: '{0}'")]
    InvalidHostId(String),

    #[error("An upstream service address is required")]
    MissingUpstream,

    #[error("Event channel capacity must be at least 1")]
    ZeroEventCapacity,
}

/// Why the registration loop is about to reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// The control connection could not be opened
    ConnectFailed,
    /// `REGISTER_HOST` could not be sent
    RegistrationFailed,
    /// The control read loop ended (EOF, read error, line failure)
    ReadLoopEnded,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::ConnectFailed => f.write_str("connect failed"),
            RetryReason::RegistrationFailed => f.write_str("registration failed"),
            RetryReason::ReadLoopEnded => f.write_str("connection lost"),
        }
    }
}

/// Fixed reconnect delays. There is no growth and no attempt limit: the
/// registration loop retries for as long as the process lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    #[serde(with = "duration_secs")]
    pub connect_failure: Duration,
    #[serde(with = "duration_secs")]
    pub registration_failure: Duration,
    #[serde(with = "duration_secs")]
    pub read_loop_ended: Duration,
}

impl RetryPolicy {
    pub fn delay(&self, reason: RetryReason) -> Duration {
        match reason {
            RetryReason::ConnectFailed => self.connect_failure,
            RetryReason::RegistrationFailed => self.registration_failure,
            RetryReason::ReadLoopEnded => self.read_loop_ended,
        }
    }

    /// Same delay for every reason (mostly useful in tests)
    pub fn fixed(delay: Duration) -> Self {
        Self {
            connect_failure: delay,
            registration_failure: delay,
            read_loop_ended: delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_failure: Duration::from_secs(10),
            registration_failure: Duration::from_secs(5),
            read_loop_ended: Duration::from_secs(5),
        }
    }
}

/// Connect timeouts used by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "duration_secs")]
    pub control_connect: Duration,
    #[serde(with = "duration_secs")]
    pub relay_data_connect: Duration,
    #[serde(with = "duration_secs")]
    pub local_service_connect: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            control_connect: CONTROL_CONNECT_TIMEOUT,
            relay_data_connect: DATA_CONNECT_TIMEOUT,
            local_service_connect: LOCAL_SERVICE_CONNECT_TIMEOUT,
        }
    }
}

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Relay control address (`host:port`); `None` runs in direct mode
    pub relay_addr: Option<String>,
    /// Identity hint; `auto` or empty generates a random identity
    pub host_id: String,
    /// Argon2 PHC hash of the session password; empty disables the password
    pub password_hash: String,
    /// Address of the local service listener
    pub listen_addr: String,
    /// Service the listener forwards connections to
    pub upstream_addr: String,
    #[serde(rename = "shutdown_timeout_secs", with = "duration_secs")]
    pub shutdown_timeout: Duration,
    pub retry: RetryPolicy,
    pub timeouts: TimeoutConfig,
    /// Capacity of the host event channel
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            relay_addr: None,
            host_id: AUTO_HOST_ID.to_string(),
            password_hash: String::new(),
            listen_addr: format!("0.0.0.0:{}", DEFAULT_DIRECT_PORT),
            upstream_addr: String::new(),
            shutdown_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            event_capacity: 64,
        }
    }
}

impl HostConfig {
    pub fn is_relay_mode(&self) -> bool {
        self.relay_addr.is_some()
    }

    /// Check address formats and the identity hint
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(relay) = &self.relay_addr {
            validate_address(relay, "relay")?;
        }
        validate_address(&self.listen_addr, "listen")?;

        if self.upstream_addr.is_empty() {
            return Err(ConfigError::MissingUpstream);
        }
        validate_address(&self.upstream_addr, "upstream")?;

        if self.host_id.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidHostId(self.host_id.clone()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }
}

/// Helper module for serializing Duration as seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
