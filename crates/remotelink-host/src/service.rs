//! Local forwarding service
//!
//! In direct mode clients connect straight to this listener; in relay mode
//! the host-side tunnel dials it. Each accepted connection is forwarded to the
//! upstream service the host exposes.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use remotelink_tunnel::{dial, splice};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::shutdown::LocalService;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to bind local service on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub struct ForwardingService {
    local_addr: SocketAddr,
    upstream_addr: String,
    /// Stops the accept loop
    stop: CancellationToken,
    /// Aborts in-flight connections
    force: CancellationToken,
    tracker: TaskTracker,
}

impl ForwardingService {
    /// Bind the listener and start accepting
    pub async fn bind(
        listen_addr: &str,
        upstream_addr: impl Into<String>,
        upstream_connect_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ServiceError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let service = Self {
            local_addr,
            upstream_addr: upstream_addr.into(),
            stop: CancellationToken::new(),
            force: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };

        tracing::info!(
            listen_addr = %local_addr,
            upstream_addr = %service.upstream_addr,
            "Local service listening"
        );

        service.tracker.spawn(accept_loop(
            listener,
            service.upstream_addr.clone(),
            upstream_connect_timeout,
            service.stop.clone(),
            service.force.clone(),
            service.tracker.clone(),
        ));

        Ok(service)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address to dial this service from the same machine; a wildcard bind
    /// is replaced by loopback
    pub fn dial_addr(&self) -> SocketAddr {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        SocketAddr::new(ip, self.local_addr.port())
    }

    /// Number of tasks still running (accept loop plus forwarded connections)
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }
}

#[async_trait]
impl LocalService for ForwardingService {
    async fn graceful_stop(&self) {
        self.stop.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!(listen_addr = %self.local_addr, "Local service stopped");
    }

    async fn force_stop(&self) {
        self.stop.cancel();
        self.force.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!(listen_addr = %self.local_addr, "Local service force stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    upstream_addr: String,
    connect_timeout: Duration,
    stop: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let (socket, peer_addr) = tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
        };

        tracing::debug!(peer_addr = %peer_addr, "Accepted connection");

        let upstream_addr = upstream_addr.clone();
        let force = force.clone();
        tracker.spawn(async move {
            tokio::select! {
                _ = force.cancelled() => {
                    tracing::info!(peer_addr = %peer_addr, "Connection aborted by shutdown");
                }
                result = forward(socket, peer_addr, &upstream_addr, connect_timeout) => {
                    if let Err(e) = result {
                        tracing::warn!(peer_addr = %peer_addr, error = %e, "Forwarding failed");
                    }
                }
            }
        });
    }

    tracing::info!("Stopped accepting connections");
}

async fn forward(
    socket: TcpStream,
    peer_addr: SocketAddr,
    upstream_addr: &str,
    connect_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let upstream = dial(upstream_addr, connect_timeout).await?;
    let report = splice(socket, upstream, &peer_addr.to_string()).await?;

    tracing::debug!(
        peer_addr = %peer_addr,
        bytes_in = report.bytes_to_local,
        bytes_out = report.bytes_to_data,
        "Connection closed"
    );
    Ok(())
}
