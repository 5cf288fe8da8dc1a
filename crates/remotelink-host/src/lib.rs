//! Host role of the relay protocol
//!
//! The host exposes a local service. In direct mode clients connect to it
//! straight away; in relay mode the host keeps a registration open with the
//! relay and opens a tunnel to the relay's data port whenever a client asks
//! for a session.
//!
//! # Example
//!
//! ```no_run
//! use remotelink_host::{EventSink, Host, HostConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HostConfig {
//!     relay_addr: Some("relay.example.com:34000".to_string()),
//!     upstream_addr: "127.0.0.1:5900".to_string(),
//!     ..Default::default()
//! };
//!
//! let (events, mut rx) = EventSink::channel(config.event_capacity);
//! let host = Host::start(config, events).await?;
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! host.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod host;
pub mod registration;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod tunnel;
pub mod tunnels;

pub use config::{ConfigError, HostConfig, RetryPolicy, RetryReason, TimeoutConfig};
pub use events::{EventSink, HostEvent};
pub use host::{Host, HostError};
pub use registration::{announce_identity, RegistrationClient};
pub use service::{ForwardingService, ServiceError};
pub use shutdown::{LocalService, ShutdownCoordinator};
pub use state::ConnectionState;
pub use tunnel::{EstablishedTunnel, HostTunnel, TunnelError};
pub use tunnels::{ActiveTunnels, TunnelInfo};
