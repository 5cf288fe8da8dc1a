//! Local endpoint for the client application
//!
//! The application connects to the proxy's local listener; the proxy then
//! opens the tunnel (relay data endpoint, or the host directly) and bridges
//! the two connections.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use remotelink_proto::TunnelRole;
use remotelink_tunnel::{dial, splice, BridgeError, BridgeReport, TunnelBridge};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::initiator::SessionGrant;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to bind local proxy on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept local connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Single-connection proxy between the local application and the tunnel
pub struct ClientProxy {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ClientProxy {
    pub async fn bind(listen_addr: &str) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| ProxyError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ProxyError::Bind {
            addr: listen_addr.to_string(),
            source,
        })?;

        tracing::info!(local_addr = %local_addr, "Client proxy listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn accept_app(&self) -> Result<TcpStream, ProxyError> {
        let (app, peer_addr) = self.listener.accept().await.map_err(ProxyError::Accept)?;
        tracing::info!(peer_addr = %peer_addr, "Application connected to proxy");
        Ok(app)
    }

    /// Bridge one application connection through the relay data endpoint
    pub async fn serve_relay(
        self,
        grant: &SessionGrant,
        connect_timeout: Duration,
    ) -> Result<BridgeReport, ProxyError> {
        let app = self.accept_app().await?;

        let data = dial(&grant.data_addr, connect_timeout)
            .await
            .map_err(|source| ProxyError::Connect {
                addr: grant.data_addr.clone(),
                source,
            })?;

        let bridge = TunnelBridge::new(grant.token.clone(), TunnelRole::ClientProxy);
        Ok(bridge.establish(data, app).await?)
    }

    /// Bridge one application connection straight to the host
    pub async fn serve_direct(
        self,
        target_addr: &str,
        connect_timeout: Duration,
    ) -> Result<BridgeReport, ProxyError> {
        let app = self.accept_app().await?;

        let host = dial(target_addr, connect_timeout)
            .await
            .map_err(|source| ProxyError::Connect {
                addr: target_addr.to_string(),
                source,
            })?;

        Ok(splice(host, app, target_addr).await?)
    }
}
