use std::fmt;

use remotelink_proto::HostIdentity;

/// What the user asked to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// `host:port` reachable without the relay
    Direct(String),
    /// Host identity registered with the relay
    Relay(HostIdentity),
}

impl ConnectTarget {
    /// Anything containing `:` and no whitespace is a direct address,
    /// everything else is a relay host ID
    pub fn classify(input: &str) -> Self {
        let input = input.trim();
        if input.contains(':') && !input.contains(char::is_whitespace) {
            ConnectTarget::Direct(input.to_string())
        } else {
            ConnectTarget::Relay(HostIdentity::from(input))
        }
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectTarget::Direct(addr) => write!(f, "direct {}", addr),
            ConnectTarget::Relay(id) => write!(f, "relay host {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            ConnectTarget::classify("192.168.1.20:32212"),
            ConnectTarget::Direct("192.168.1.20:32212".to_string())
        );
        assert_eq!(
            ConnectTarget::classify("  [::1]:32212 "),
            ConnectTarget::Direct("[::1]:32212".to_string())
        );
        assert_eq!(
            ConnectTarget::classify("a1b2c3d4"),
            ConnectTarget::Relay(HostIdentity::from("a1b2c3d4"))
        );
        assert_eq!(
            ConnectTarget::classify("office pc:1"),
            ConnectTarget::Relay(HostIdentity::from("office pc:1"))
        );
    }
}
