//! Persistent registration with the relay
//!
//! The registration loop owns the control connection. It registers the host
//! identity, answers password checks and starts a tunnel task for every
//! `CREATE_TUNNEL`. Whenever the connection is lost it waits a fixed delay and
//! starts over; it only stops when its task is dropped or aborted.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use remotelink_auth::SessionCredential;
use remotelink_proto::{
    identity_line, relay_data_address, CodecError, HostIdentity, RelayCodec, RelayCommand,
    SessionToken,
};
use remotelink_tunnel::dial;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;

use crate::config::{RetryPolicy, RetryReason, TimeoutConfig};
use crate::events::{EventSink, HostEvent};
use crate::state::ConnectionState;
use crate::tunnel::HostTunnel;
use crate::tunnels::{ActiveTunnels, TunnelInfo};

type ControlConnection = Framed<TcpStream, RelayCodec>;

/// Write the `EFFECTIVE_HOST_ID:<id>` line the launching process reads
pub fn announce_identity(id: &HostIdentity) {
    let mut stdout = std::io::stdout().lock();
    let written = stdout
        .write_all(identity_line(id).as_bytes())
        .and_then(|_| stdout.flush());
    if let Err(e) = written {
        tracing::warn!(error = %e, "Failed to announce host identity on stdout");
    }
}

pub struct RegistrationClient {
    relay_addr: String,
    /// Identity proposed in every `REGISTER_HOST`, reconnects included
    initial_identity: HostIdentity,
    local_service_addr: String,
    credential: Arc<SessionCredential>,
    retry: RetryPolicy,
    timeouts: TimeoutConfig,
    events: EventSink,
    tunnels: ActiveTunnels,
    identity_tx: watch::Sender<Option<HostIdentity>>,
    state: ConnectionState,
}

impl RegistrationClient {
    pub fn new(
        relay_addr: impl Into<String>,
        initial_identity: HostIdentity,
        local_service_addr: impl Into<String>,
        credential: SessionCredential,
    ) -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            relay_addr: relay_addr.into(),
            initial_identity,
            local_service_addr: local_service_addr.into(),
            credential: Arc::new(credential),
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            events: EventSink::disabled(),
            tunnels: ActiveTunnels::new(),
            identity_tx,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Identity confirmed by the relay. `None` until the first
    /// `HOST_REGISTERED`; may change after a reconnect.
    pub fn identity(&self) -> watch::Receiver<Option<HostIdentity>> {
        self.identity_tx.subscribe()
    }

    pub fn tunnels(&self) -> ActiveTunnels {
        self.tunnels.clone()
    }

    /// Run the registration loop forever
    pub async fn run(mut self) {
        tracing::info!(relay = %self.relay_addr, "Starting relay registration loop");
        loop {
            let reason = self.run_once().await;
            let delay = self.retry.delay(reason);

            tracing::info!(
                reason = %reason,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to relay after delay"
            );
            self.events
                .emit(HostEvent::RegistrationRetrying { reason, delay });
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection attempt; returns why it ended
    async fn run_once(&mut self) -> RetryReason {
        self.transition(ConnectionState::Connecting);

        let stream = match dial(&self.relay_addr, self.timeouts.control_connect).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(relay = %self.relay_addr, error = %e, "Failed to connect to relay");
                self.transition(ConnectionState::Disconnected);
                return RetryReason::ConnectFailed;
            }
        };
        tracing::info!(relay = %self.relay_addr, "Connected to relay");

        let mut control = Framed::new(stream, RelayCodec::new());
        let hint = self.initial_identity.clone();

        self.transition(ConnectionState::Registering);
        if let Err(e) = control
            .send(RelayCommand::RegisterHost { hint: hint.clone() })
            .await
        {
            tracing::warn!(error = %e, "Failed to send registration to relay");
            self.transition(ConnectionState::Disconnected);
            return RetryReason::RegistrationFailed;
        }
        tracing::info!(host_id = %hint, "Sent registration, waiting for confirmation");

        self.read_loop(&mut control).await;
        self.transition(ConnectionState::Disconnected);
        RetryReason::ReadLoopEnded
    }

    async fn read_loop(&mut self, control: &mut ControlConnection) {
        while let Some(line) = control.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read from relay");
                    return;
                }
            };
            if line.is_empty() {
                continue;
            }

            let command = match RelayCommand::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed relay command");
                    continue;
                }
            };

            if let Err(e) = self.dispatch(command, control).await {
                tracing::warn!(error = %e, "Failed to write to relay");
                return;
            }
        }
        tracing::info!("Relay closed the control connection");
    }

    async fn dispatch(
        &mut self,
        command: RelayCommand,
        control: &mut ControlConnection,
    ) -> Result<(), CodecError> {
        tracing::debug!(command = command.name(), "Received relay command");

        match command {
            RelayCommand::HostRegistered { host_id } => {
                self.on_registered(host_id);
                Ok(())
            }
            RelayCommand::VerifyPasswordRequest { token, password } => {
                self.on_verify_password(token, password, control).await
            }
            RelayCommand::CreateTunnel { port, token } => {
                self.on_create_tunnel(port, token).await;
                Ok(())
            }
            RelayCommand::Unknown { name, .. } => {
                tracing::warn!(command = %name, "Unknown command from relay");
                Ok(())
            }
            other => {
                tracing::warn!(command = other.name(), "Unexpected command from relay");
                Ok(())
            }
        }
    }

    fn on_registered(&mut self, host_id: HostIdentity) {
        if self.state == ConnectionState::Registering {
            self.transition(ConnectionState::Registered);
        }
        tracing::info!(host_id = %host_id, "Registered with relay");

        self.identity_tx.send_replace(Some(host_id.clone()));
        announce_identity(&host_id);
        self.events.emit(HostEvent::IdentityAssigned { host_id });
    }

    async fn on_verify_password(
        &mut self,
        token: SessionToken,
        password: String,
        control: &mut ControlConnection,
    ) -> Result<(), CodecError> {
        tracing::debug!(token = %token.short(), "Verifying session password");

        let credential = self.credential.clone();
        // Argon2 is CPU bound; the reply still goes out before the next command
        let valid = tokio::task::spawn_blocking(move || credential.verify(&password))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Password verification task failed");
                false
            });

        tracing::info!(token = %token.short(), valid, "Password verification result");
        control
            .send(RelayCommand::VerifyPasswordResponse {
                token: token.clone(),
                valid,
            })
            .await?;
        self.events
            .emit(HostEvent::PasswordVerified { token, valid });
        Ok(())
    }

    async fn on_create_tunnel(&mut self, port: u16, token: SessionToken) {
        // Any identity confirmed so far is enough, including one from a previous
        // connection whose re-registration is still pending
        if self.identity_tx.borrow().is_none() {
            tracing::warn!(
                token = %token.short(),
                "Ignoring tunnel request received before registration"
            );
            return;
        }

        let relay_data_addr = match relay_data_address(&self.relay_addr, port) {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(token = %token.short(), error = %e, "Cannot derive relay data address");
                return;
            }
        };

        let registered = self
            .tunnels
            .try_register(TunnelInfo {
                token: token.clone(),
                relay_data_addr: relay_data_addr.clone(),
                established_at: Instant::now(),
            })
            .await;
        if !registered {
            return;
        }

        let tunnel = HostTunnel {
            token: token.clone(),
            relay_data_addr,
            local_service_addr: self.local_service_addr.clone(),
            timeouts: self.timeouts.clone(),
        };
        let tunnels = self.tunnels.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let result = async {
                let established = tunnel.connect().await?;
                events.emit(HostEvent::TunnelActive {
                    token: token.clone(),
                });
                established.run().await
            }
            .await;

            let ended = match result {
                Ok(report) => HostEvent::TunnelEnded {
                    token: token.clone(),
                    bytes_to_local: report.bytes_to_local,
                    bytes_to_relay: report.bytes_to_data,
                    error: report
                        .data_to_local_error
                        .as_ref()
                        .or(report.local_to_data_error.as_ref())
                        .map(|e| e.to_string()),
                },
                Err(e) => {
                    tracing::error!(token = %token.short(), error = %e, "Tunnel failed");
                    HostEvent::TunnelEnded {
                        token: token.clone(),
                        bytes_to_local: 0,
                        bytes_to_relay: 0,
                        error: Some(e.to_string()),
                    }
                }
            };

            tunnels.unregister(&token).await;
            events.emit(ended);
        });
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Refusing illegal state transition");
            return;
        }

        let from = std::mem::replace(&mut self.state, next);
        tracing::debug!(from = %from, to = %next, "Connection state changed");
        self.events
            .emit(HostEvent::StateChanged { from, to: next });
    }
}
