//! Events emitted by the host core for a presentation layer
//!
//! The core never touches display state. It pushes [`HostEvent`]s into a
//! bounded channel; if the consumer falls behind, new events are dropped
//! rather than stalling the registration loop.

use std::time::Duration;

use remotelink_proto::{HostIdentity, SessionToken};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::RetryReason;
use crate::state::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// The relay confirmed (or reassigned) the host identity
    IdentityAssigned { host_id: HostIdentity },
    RegistrationRetrying {
        reason: RetryReason,
        delay: Duration,
    },
    PasswordVerified { token: SessionToken, valid: bool },
    /// Relay data and local service connections are both up
    TunnelActive { token: SessionToken },
    TunnelEnded {
        token: SessionToken,
        bytes_to_local: u64,
        bytes_to_relay: u64,
        /// Unexpected failure, if any; normal closes leave this empty
        error: Option<String>,
    },
}

/// Sending half of the event channel. Cloneable; a sink without a channel
/// discards everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<HostEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<HostEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that discards every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a sink and the matching receiver
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<HostEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Emit without waiting. A full channel drops this event.
    pub fn emit(&self, event: HostEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(?event, "Event channel full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> HostEvent {
        HostEvent::IdentityAssigned {
            host_id: HostIdentity::from(id),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_newest() {
        let (sink, mut rx) = EventSink::channel(2);
        sink.emit(identity("first"));
        sink.emit(identity("second"));
        sink.emit(identity("third"));

        assert_eq!(rx.recv().await, Some(identity("first")));
        assert_eq!(rx.recv().await, Some(identity("second")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_channel_is_ignored() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.emit(identity("nobody listening"));
        EventSink::disabled().emit(identity("nowhere"));
    }
}
