//! Classification of errors that merely mean "the peer went away"
//!
//! Copy loops end when either side closes, and depending on timing and
//! platform that shows up as a clean EOF, a reset, a broken pipe or a read on
//! a connection this process already closed. None of those are failures.

use std::io;

/// Message used for I/O attempted through an already closed [`ConnectionHandle`]
///
/// [`ConnectionHandle`]: crate::ConnectionHandle
pub const CLOSED_CONNECTION_MESSAGE: &str = "use of closed network connection";

const CLOSE_MARKERS: &[&str] = &[
    CLOSED_CONNECTION_MESSAGE,
    "connection reset by peer",
    "broken pipe",
    "forcibly closed",
];

/// Whether an error message describes a normal network close
pub fn is_network_close_message(message: &str) -> bool {
    if message.trim() == "EOF" {
        return true;
    }
    let lower = message.to_ascii_lowercase();
    CLOSE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Whether an I/O error is a normal network close rather than a failure
pub fn is_network_close_error(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => true,
        _ => is_network_close_message(&err.to_string()),
    }
}

/// [`is_network_close_error`] for an optional error; no error is not a close
pub fn is_close(err: Option<&io::Error>) -> bool {
    err.is_some_and(is_network_close_error)
}

/// The error returned for I/O through a closed handle
pub fn closed_connection_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, CLOSED_CONNECTION_MESSAGE)
}
