//! Client role of the relay protocol
//!
//! A client reaches a host either directly by address, or through the relay
//! by host ID. The relay path is a one-shot [`SessionInitiator`] exchange
//! followed by a [`ClientProxy`] that bridges the local application with the
//! relay data endpoint.

pub mod initiator;
pub mod proxy;
pub mod target;

pub use initiator::{SessionError, SessionFailure, SessionGrant, SessionInitiator};
pub use proxy::{ClientProxy, ProxyError};
pub use target::ConnectTarget;
