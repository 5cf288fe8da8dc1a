//! Back-to-back byte bridge between a relay data connection and a local service
//!
//! A bridge runs two copy tasks, relay→local and local→relay. Whichever finishes
//! first closes both connections, which unblocks its sibling; the bridge
//! returns once both tasks have been joined.

use std::fmt;
use std::io;
use std::sync::Arc;

use remotelink_proto::{RelayCommand, SessionToken, TunnelRole};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;

use crate::close::{closed_connection_error, is_network_close_error};
use crate::handle::ConnectionHandle;

/// Copy buffer per direction (32KB)
const COPY_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to send session identification: {0}")]
    Identification(#[source] io::Error),

    #[error("Copy task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a finished bridge.
///
/// Error fields only hold unexpected errors; closes, resets and broken pipes
/// count as normal termination.
#[derive(Debug, Default)]
pub struct BridgeReport {
    pub bytes_to_local: u64,
    pub bytes_to_data: u64,
    pub data_to_local_error: Option<io::Error>,
    pub local_to_data_error: Option<io::Error>,
}

impl BridgeReport {
    pub fn is_clean(&self) -> bool {
        self.data_to_local_error.is_none() && self.local_to_data_error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    DataToLocal,
    LocalToData,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::DataToLocal => f.write_str("relay to local"),
            Direction::LocalToData => f.write_str("local to relay"),
        }
    }
}

/// One end of a relay tunnel, identified by its session token and role
#[derive(Debug, Clone)]
pub struct TunnelBridge {
    token: SessionToken,
    role: TunnelRole,
}

impl TunnelBridge {
    pub fn new(token: SessionToken, role: TunnelRole) -> Self {
        Self { token, role }
    }

    /// Write the `SESSION_TOKEN <token> <role>` line the relay uses to pair
    /// the two data connections of a tunnel
    pub async fn identify<W>(&self, data: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let line = RelayCommand::IdentifySession {
            token: self.token.clone(),
            role: self.role,
        }
        .to_line();
        data.write_all(line.as_bytes()).await?;
        data.flush().await?;

        tracing::debug!(
            token = %self.token.short(),
            role = %self.role,
            "Sent session identification"
        );
        Ok(())
    }

    /// Identify on the data connection, then bridge it with `local`.
    ///
    /// A failed identification aborts the attempt without retry.
    pub async fn establish<D, L>(&self, mut data: D, local: L) -> Result<BridgeReport, BridgeError>
    where
        D: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        L: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        self.identify(&mut data)
            .await
            .map_err(BridgeError::Identification)?;
        self.run(data, local).await
    }

    /// Bridge an already identified data connection with `local`
    pub async fn run<D, L>(&self, data: D, local: L) -> Result<BridgeReport, BridgeError>
    where
        D: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        L: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        splice(data, local, self.token.short()).await
    }
}

/// Copy bytes both ways between `data` and `local` until either side closes.
///
/// `label` only tags log lines.
pub async fn splice<D, L>(data: D, local: L, label: &str) -> Result<BridgeReport, BridgeError>
where
    D: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    L: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let data_handle = ConnectionHandle::new("data");
    let local_handle = ConnectionHandle::new("local");
    let (data_read, data_write) = tokio::io::split(data);
    let (local_read, local_write) = tokio::io::split(local);
    let label: Arc<str> = Arc::from(label);

    // Dropping the set aborts whichever copy task is still running
    let mut tasks = JoinSet::new();
    tasks.spawn(pump(
        data_read,
        local_write,
        data_handle.clone(),
        local_handle.clone(),
        Direction::DataToLocal,
        label.clone(),
    ));
    tasks.spawn(pump(
        local_read,
        data_write,
        local_handle,
        data_handle,
        Direction::LocalToData,
        label.clone(),
    ));

    let mut report = BridgeReport::default();
    while let Some(joined) = tasks.join_next().await {
        let (direction, bytes, error) = joined?;
        match direction {
            Direction::DataToLocal => {
                report.bytes_to_local = bytes;
                report.data_to_local_error = error;
            }
            Direction::LocalToData => {
                report.bytes_to_data = bytes;
                report.local_to_data_error = error;
            }
        }
    }

    tracing::info!(
        tunnel = %label,
        bytes_to_local = report.bytes_to_local,
        bytes_to_data = report.bytes_to_data,
        "Proxying finished, tunnel closed"
    );

    Ok(report)
}

/// One copy direction. Always closes both connections on exit.
async fn pump<R, W>(
    mut src: R,
    mut dst: W,
    src_handle: ConnectionHandle,
    dst_handle: ConnectionHandle,
    direction: Direction,
    label: Arc<str>,
) -> (Direction, u64, Option<io::Error>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = copy_until_closed(&mut src, &mut dst, &src_handle, &dst_handle).await;

    let _ = dst.shutdown().await;
    src_handle.close();
    dst_handle.close();

    match result {
        Ok(bytes) => {
            tracing::info!(tunnel = %label, %direction, bytes, "Finished copying");
            (direction, bytes, None)
        }
        Err((bytes, e)) if is_network_close_error(&e) => {
            tracing::info!(tunnel = %label, %direction, bytes, reason = %e, "Finished copying");
            (direction, bytes, None)
        }
        Err((bytes, e)) => {
            tracing::error!(tunnel = %label, %direction, bytes, error = %e, "Error while copying");
            (direction, bytes, Some(e))
        }
    }
}

async fn copy_until_closed<R, W>(
    src: &mut R,
    dst: &mut W,
    src_handle: &ConnectionHandle,
    dst_handle: &ConnectionHandle,
) -> Result<u64, (u64, io::Error)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = src_handle.closed() => return Err((total, closed_connection_error())),
            _ = dst_handle.closed() => return Err((total, closed_connection_error())),
            read = src.read(&mut buf) => match read {
                Ok(0) => return Ok(total),
                Ok(n) => n,
                Err(e) => return Err((total, e)),
            },
        };

        tokio::select! {
            biased;
            _ = dst_handle.closed() => return Err((total, closed_connection_error())),
            written = async {
                dst.write_all(&buf[..n]).await?;
                dst.flush().await
            } => {
                if let Err(e) = written {
                    return Err((total, e));
                }
            }
        }

        total += n as u64;
    }
}
