use std::fmt;

/// State of one control connection attempt.
///
/// ```text
/// Disconnected -> Connecting -> Registering -> Registered
///      ^              |              |             |
///      +--------------+--------------+-------------+
/// ```
///
/// Every state falls back to `Disconnected` on failure; there is no terminal
/// state while the host process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    /// Opening the control connection
    Connecting,
    /// `REGISTER_HOST` sent, waiting for `HOST_REGISTERED`
    Registering,
    /// Identity confirmed, dispatching relay commands
    Registered,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Registering)
                | (Connecting, Disconnected)
                | (Registering, Registered)
                | (Registering, Disconnected)
                | (Registered, Disconnected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Registering => "registering",
            ConnectionState::Registered => "registered",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
