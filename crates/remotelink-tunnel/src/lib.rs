//! Tunnel bridging for relay data connections
//!
//! A tunnel is a pair of TCP connections spliced back to back: the data
//! connection to the relay and a connection to the local endpoint (the host's
//! service, or the client application on the client side). This crate owns
//! the session identification handshake, the bidirectional copy and the rules
//! for deciding whether a copy loop ended normally.

pub mod bridge;
pub mod close;
pub mod dial;
pub mod handle;

pub use bridge::{splice, BridgeError, BridgeReport, TunnelBridge};
pub use close::{
    closed_connection_error, is_close, is_network_close_error, is_network_close_message,
    CLOSED_CONNECTION_MESSAGE,
};
pub use dial::dial;
pub use handle::ConnectionHandle;
