//! One-shot session request against the relay
//!
//! The client opens a control connection, sends `INITIATE_CLIENT_SESSION`,
//! reads exactly one response line and closes the connection. The data
//! endpoint it learns is used on a separate connection.

use std::fmt;
use std::io;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use remotelink_proto::{
    relay_data_address, validate_address, AddressError, CodecError, HostIdentity, RelayCodec,
    RelayCommand, SessionToken, CONTROL_CONNECT_TIMEOUT, SESSION_RESPONSE_TIMEOUT,
};
use remotelink_tunnel::dial;
use thiserror::Error;
use tokio_util::codec::Framed;

/// Coarse outcome of a failed session request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFailure {
    HostNotFound,
    AuthenticationFailed,
    Transport,
    Protocol,
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailure::HostNotFound => f.write_str("host not found"),
            SessionFailure::AuthenticationFailed => f.write_str("authentication failed"),
            SessionFailure::Transport => f.write_str("transport error"),
            SessionFailure::Protocol => f.write_str("protocol error"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Host {0} is not registered with the relay")]
    HostNotFound(HostIdentity),

    #[error("Authentication failed for host {0}")]
    AuthenticationFailed(HostIdentity),

    #[error("Failed to {context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Unexpected relay response: {0}")]
    Protocol(String),
}

impl SessionError {
    pub fn kind(&self) -> SessionFailure {
        match self {
            SessionError::HostNotFound(_) => SessionFailure::HostNotFound,
            SessionError::AuthenticationFailed(_) => SessionFailure::AuthenticationFailed,
            SessionError::Transport { .. } => SessionFailure::Transport,
            SessionError::Protocol(_) => SessionFailure::Protocol,
        }
    }

    fn transport(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| SessionError::Transport { context, source }
    }

    fn codec(context: &'static str) -> impl FnOnce(CodecError) -> Self {
        move |e| match e {
            CodecError::Io(source) => SessionError::Transport { context, source },
            other => SessionError::Protocol(other.to_string()),
        }
    }
}

/// Data endpoint and token granted by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub host_id: HostIdentity,
    /// Relay data endpoint (`host:port`)
    pub data_addr: String,
    pub token: SessionToken,
}

#[derive(Debug, Clone)]
pub struct SessionInitiator {
    relay_addr: String,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl SessionInitiator {
    pub fn new(relay_addr: impl Into<String>) -> Result<Self, AddressError> {
        let relay_addr = relay_addr.into();
        validate_address(&relay_addr, "relay")?;
        Ok(Self {
            relay_addr,
            connect_timeout: CONTROL_CONNECT_TIMEOUT,
            response_timeout: SESSION_RESPONSE_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn relay_addr(&self) -> &str {
        &self.relay_addr
    }

    /// Ask the relay for a session with `host_id`
    pub async fn initiate(
        &self,
        host_id: &HostIdentity,
        password: Option<&str>,
    ) -> Result<SessionGrant, SessionError> {
        tracing::info!(relay = %self.relay_addr, host_id = %host_id, "Requesting session via relay");

        let stream = dial(&self.relay_addr, self.connect_timeout)
            .await
            .map_err(SessionError::transport("connect to relay"))?;
        let mut control = Framed::new(stream, RelayCodec::new());

        control
            .send(RelayCommand::InitiateClientSession {
                host_id: host_id.clone(),
                password: password.map(str::to_string),
            })
            .await
            .map_err(SessionError::codec("send session request"))?;

        let line = match tokio::time::timeout(self.response_timeout, control.next()).await {
            Ok(Some(line)) => line.map_err(SessionError::codec("read relay response"))?,
            Ok(None) => {
                return Err(SessionError::Transport {
                    context: "read relay response",
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "relay closed the connection without responding",
                    ),
                })
            }
            Err(_) => {
                return Err(SessionError::Transport {
                    context: "read relay response",
                    source: io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no response within {:?}", self.response_timeout),
                    ),
                })
            }
        };
        drop(control);

        self.interpret(host_id, &line)
    }

    fn interpret(&self, host_id: &HostIdentity, line: &str) -> Result<SessionGrant, SessionError> {
        match RelayCommand::parse(line) {
            Ok(RelayCommand::SessionReady { port, token }) => {
                let data_addr = relay_data_address(&self.relay_addr, port)
                    .map_err(|e| SessionError::Protocol(e.to_string()))?;
                tracing::info!(
                    host_id = %host_id,
                    token = %token.short(),
                    data_addr = %data_addr,
                    "Relay session ready"
                );
                Ok(SessionGrant {
                    host_id: host_id.clone(),
                    data_addr,
                    token,
                })
            }
            Ok(RelayCommand::ErrorHostNotFound) => Err(SessionError::HostNotFound(host_id.clone())),
            Ok(RelayCommand::ErrorAuthenticationFailed) => {
                Err(SessionError::AuthenticationFailed(host_id.clone()))
            }
            Ok(other) => Err(SessionError::Protocol(format!(
                "unexpected {} response",
                other.name()
            ))),
            Err(e) => Err(SessionError::Protocol(format!("{} in {:?}", e, line))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initiator() -> SessionInitiator {
        SessionInitiator::new("relay.example.com:34000").unwrap()
    }

    #[test]
    fn test_new_validates_relay_address() {
        assert!(SessionInitiator::new("relay.example.com").is_err());
        assert!(SessionInitiator::new(":34000").is_err());
    }

    #[test]
    fn test_interpret_responses() {
        let host = HostIdentity::from("abcd1234");

        let grant = initiator()
            .interpret(&host, "SESSION_READY 40123 tok-xyz")
            .unwrap();
        assert_eq!(grant.data_addr, "relay.example.com:40123");
        assert_eq!(grant.token, SessionToken::from("tok-xyz"));

        let kind = |line: &str| initiator().interpret(&host, line).unwrap_err().kind();
        assert_eq!(kind("ERROR_HOST_NOT_FOUND"), SessionFailure::HostNotFound);
        assert_eq!(
            kind("ERROR_AUTHENTICATION_FAILED"),
            SessionFailure::AuthenticationFailed
        );
        assert_eq!(kind(""), SessionFailure::Protocol);
        assert_eq!(kind("SESSION_READY 40123"), SessionFailure::Protocol);
        assert_eq!(kind("SESSION_READY notaport tok"), SessionFailure::Protocol);
        assert_eq!(kind("HOST_REGISTERED abcd1234"), SessionFailure::Protocol);
        assert_eq!(kind("WHAT_IS_THIS"), SessionFailure::Protocol);
    }
}
