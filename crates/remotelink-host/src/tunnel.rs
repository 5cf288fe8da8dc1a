//! Host side of a relay tunnel

use std::io;

use remotelink_proto::{SessionToken, TunnelRole};
use remotelink_tunnel::{dial, BridgeError, BridgeReport, TunnelBridge};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::TimeoutConfig;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Failed to connect to relay data endpoint {addr}: {source}")]
    RelayConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to local service {addr}: {source}")]
    LocalConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// One `CREATE_TUNNEL` request, executed on its own task
#[derive(Debug, Clone)]
pub struct HostTunnel {
    pub token: SessionToken,
    pub relay_data_addr: String,
    pub local_service_addr: String,
    pub timeouts: TimeoutConfig,
}

/// Both connections of a tunnel are up and the relay side is identified
pub struct EstablishedTunnel {
    bridge: TunnelBridge,
    data: TcpStream,
    local: TcpStream,
}

impl EstablishedTunnel {
    /// Bridge the two connections until either side closes
    pub async fn run(self) -> Result<BridgeReport, TunnelError> {
        Ok(self.bridge.run(self.data, self.local).await?)
    }
}

impl HostTunnel {
    /// Dial the relay data endpoint, identify as `HOST_PROXY`, then dial the
    /// local service
    pub async fn connect(&self) -> Result<EstablishedTunnel, TunnelError> {
        let token = self.token.short();

        tracing::info!(
            token = %token,
            relay_data_addr = %self.relay_data_addr,
            "Connecting to relay data endpoint"
        );
        let mut data = dial(&self.relay_data_addr, self.timeouts.relay_data_connect)
            .await
            .map_err(|source| TunnelError::RelayConnect {
                addr: self.relay_data_addr.clone(),
                source,
            })?;

        let bridge = TunnelBridge::new(self.token.clone(), TunnelRole::HostProxy);
        bridge
            .identify(&mut data)
            .await
            .map_err(BridgeError::Identification)?;

        let local = dial(&self.local_service_addr, self.timeouts.local_service_connect)
            .await
            .map_err(|source| TunnelError::LocalConnect {
                addr: self.local_service_addr.clone(),
                source,
            })?;

        tracing::info!(
            token = %token,
            local_service_addr = %self.local_service_addr,
            "Tunnel established, proxying"
        );
        Ok(EstablishedTunnel {
            bridge,
            data,
            local,
        })
    }
}
