use std::net::SocketAddr;
use std::sync::Arc;

use remotelink_auth::{PasswordError, SessionCredential};
use remotelink_proto::HostIdentity;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, HostConfig};
use crate::events::EventSink;
use crate::registration::{announce_identity, RegistrationClient};
use crate::service::{ForwardingService, ServiceError};
use crate::shutdown::{LocalService, ShutdownCoordinator};
use crate::tunnels::ActiveTunnels;

/// Fatal startup errors
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot load session credential: {0}")]
    Credential(#[from] PasswordError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// A running host: local service plus, in relay mode, the registration loop
pub struct Host {
    service: Arc<ForwardingService>,
    shutdown: Arc<ShutdownCoordinator>,
    identity: watch::Receiver<Option<HostIdentity>>,
    tunnels: ActiveTunnels,
    registration: Option<JoinHandle<()>>,
}

impl Host {
    pub async fn start(config: HostConfig, events: EventSink) -> Result<Self, HostError> {
        config.validate()?;
        let credential = SessionCredential::from_config(&config.password_hash)?;
        if credential.is_protected() {
            tracing::info!("Session password protection enabled");
        } else {
            tracing::warn!("No session password configured, any client may connect");
        }

        let service = Arc::new(
            ForwardingService::bind(
                &config.listen_addr,
                config.upstream_addr.clone(),
                config.timeouts.local_service_connect,
            )
            .await?,
        );
        let shutdown = Arc::new(ShutdownCoordinator::new(
            service.clone() as Arc<dyn LocalService>,
            config.shutdown_timeout,
        ));

        let initial = HostIdentity::resolve_hint(&config.host_id);

        match &config.relay_addr {
            Some(relay_addr) => {
                let client = RegistrationClient::new(
                    relay_addr.clone(),
                    initial,
                    service.dial_addr().to_string(),
                    credential,
                )
                .with_retry(config.retry.clone())
                .with_timeouts(config.timeouts.clone())
                .with_events(events);

                let identity = client.identity();
                let tunnels = client.tunnels();
                let registration = tokio::spawn(client.run());

                Ok(Self {
                    service,
                    shutdown,
                    identity,
                    tunnels,
                    registration: Some(registration),
                })
            }
            None => {
                // Direct mode: the provisional identity is final
                tracing::info!(host_id = %initial, "Running in direct mode");
                announce_identity(&initial);
                let (_, identity) = watch::channel(Some(initial));

                Ok(Self {
                    service,
                    shutdown,
                    identity,
                    tunnels: ActiveTunnels::new(),
                    registration: None,
                })
            }
        }
    }

    pub fn identity(&self) -> watch::Receiver<Option<HostIdentity>> {
        self.identity.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.service.local_addr()
    }

    pub fn tunnels(&self) -> &ActiveTunnels {
        &self.tunnels
    }

    pub fn shutdown_coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.shutdown.clone()
    }

    /// Stop the local service and, since the process is exiting, the
    /// registration loop. Returns whether the service was still running.
    pub async fn shutdown(mut self) -> bool {
        let stopped = self.shutdown.try_graceful_shutdown().await;
        if let Some(registration) = self.registration.take() {
            registration.abort();
        }
        stopped
    }
}
