//! `host:port` helpers
//!
//! Relay data endpoints are announced as a bare port; the host part is always
//! taken from the relay control address the peer is already talking to.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid {kind} address format: '{address}' (expected format: host:port)")]
    MissingPort { kind: String, address: String },

    #[error("Invalid {kind} address format: '{address}' (host cannot be empty)")]
    EmptyHost { kind: String, address: String },

    #[error("Invalid port in {kind} address: '{address}'")]
    InvalidPort { kind: String, address: String },
}

/// Split `host:port` (or `[v6]:port`) into its host and port parts
fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        return Some((host, port));
    }
    let (host, port) = addr.rsplit_once(':')?;
    // Unbracketed IPv6 literals are ambiguous.
    if host.contains(':') {
        return None;
    }
    Some((host, port))
}

/// Host part of a `host:port` address, without IPv6 brackets
pub fn split_host(addr: &str) -> Result<&str, AddressError> {
    split_host_port(addr)
        .map(|(host, _)| host)
        .ok_or_else(|| AddressError::MissingPort {
            kind: "relay".to_string(),
            address: addr.to_string(),
        })
}

/// Join a host and port, bracketing IPv6 literals
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Relay data endpoint for a dynamic port announced over `control_addr`
pub fn relay_data_address(control_addr: &str, port: u16) -> Result<String, AddressError> {
    let host = split_host(control_addr)?;
    Ok(join_host_port(host, port))
}

/// Validate `host:port` format, `kind` names the address in error messages
pub fn validate_address(addr: &str, kind: &str) -> Result<(), AddressError> {
    let (host, port) = split_host_port(addr).ok_or_else(|| AddressError::MissingPort {
        kind: kind.to_string(),
        address: addr.to_string(),
    })?;

    if host.is_empty() {
        return Err(AddressError::EmptyHost {
            kind: kind.to_string(),
            address: addr.to_string(),
        });
    }

    port.parse::<u16>().map_err(|_| AddressError::InvalidPort {
        kind: kind.to_string(),
        address: addr.to_string(),
    })?;

    Ok(())
}
