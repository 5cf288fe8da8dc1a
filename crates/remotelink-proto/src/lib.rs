//! Relay Protocol Definitions
//!
//! This crate defines the line-oriented control protocol spoken between a host,
//! a client and the relay server, together with the identity types shared by
//! every role.
//!
//! Control commands are ASCII lines terminated by `\n` with whitespace-separated
//! fields. There is no length prefix and no checksum. Data connections carry a
//! single `SESSION_TOKEN <token> <role>` line followed by raw bytes.

pub mod addr;
pub mod codec;
pub mod command;
pub mod identity;

pub use addr::{join_host_port, relay_data_address, split_host, validate_address, AddressError};
pub use codec::{CodecError, RelayCodec};
pub use command::{ParseError, RelayCommand, TunnelRole};
pub use identity::{generate_random_host_id, identity_line, HostIdentity, SessionToken};

use std::time::Duration;

/// Prefix of the stdout line announcing the effective host identity
pub const EFFECTIVE_HOST_ID_PREFIX: &str = "EFFECTIVE_HOST_ID:";

/// Identity hint that requests a locally generated random identity
pub const AUTO_HOST_ID: &str = "auto";

/// Number of random bytes in a generated host identity (8 hex characters)
pub const HOST_ID_BYTES: usize = 4;

/// Default port of the direct-mode service listener
pub const DEFAULT_DIRECT_PORT: u16 = 32212;

/// Default relay control address
pub const DEFAULT_RELAY_CONTROL_ADDR: &str = "localhost:34000";

/// Connect timeout for relay control connections (host and client)
pub const CONTROL_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout for relay data connections
pub const DATA_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout from the host to its local service
pub const LOCAL_SERVICE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read deadline for the client's single response line
pub const SESSION_RESPONSE_TIMEOUT: Duration = Duration::from_secs(20);

/// Maximum accepted control line length (8KB)
pub const MAX_LINE_LENGTH: usize = 8 * 1024;
