//! Remotelink - expose a local service to remote clients, directly or through a relay
//!
//! `remotelink host` runs the host side: a local listener forwarding to the
//! service being shared and, when a relay is configured, the registration loop
//! that answers the relay's tunnel requests. `remotelink connect` runs the
//! client side.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remotelink_auth::hash_password;
use remotelink_client::{ClientProxy, ConnectTarget, SessionFailure, SessionInitiator};
use remotelink_host::{EventSink, Host, HostConfig, HostEvent};
use remotelink_proto::{validate_address, DATA_CONNECT_TIMEOUT, DEFAULT_RELAY_CONTROL_ADDR};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Remotelink - share a local service through a relay or directly
#[derive(Parser, Debug)]
#[command(name = "remotelink")]
#[command(about = "Remotelink - share a local service through a relay or directly")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "REMOTELINK_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Share a local service
    #[command(long_about = r#"
Share a local service. Without --relay the host runs in direct mode and
clients connect to the listen address. With --relay the host registers with
the relay and serves tunnels the relay asks for.

The effective host ID is printed on stdout as a single line:
  EFFECTIVE_HOST_ID:<id>

EXAMPLES:
  # Direct mode
  remotelink host --upstream 127.0.0.1:5900

  # Through a relay, password protected
  remotelink host --relay relay.example.com:34000 \
    --upstream 127.0.0.1:5900 \
    --password-hash "$(remotelink hash-password --password s3cret)"

  # From a config file
  remotelink host --config host.yaml

ENVIRONMENT VARIABLES:
  REMOTELINK_RELAY          Relay control address (host:port)
  REMOTELINK_HOST_ID        Identity hint ("auto" generates one)
  REMOTELINK_PASSWORD_HASH  Argon2 hash of the session password
  REMOTELINK_LISTEN         Local listener address
  REMOTELINK_UPSTREAM       Service to share (host:port)
"#)]
    Host(HostArgs),

    /// Connect to a host by relay host ID or direct address
    Connect(ConnectArgs),

    /// Print the argon2 hash of a session password
    HashPassword {
        /// Password to hash (read from stdin if omitted)
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct HostArgs {
    /// Relay control address (e.g., relay.example.com:34000)
    #[arg(long, env = "REMOTELINK_RELAY")]
    relay: Option<String>,

    /// Host ID hint ("auto" for a random ID)
    #[arg(long, env = "REMOTELINK_HOST_ID")]
    host_id: Option<String>,

    /// Argon2 PHC hash of the session password (empty for none)
    #[arg(long, env = "REMOTELINK_PASSWORD_HASH", hide_env_values = true)]
    password_hash: Option<String>,

    /// Local listener address
    #[arg(long, env = "REMOTELINK_LISTEN")]
    listen: Option<String>,

    /// Service to share (host:port)
    #[arg(long, env = "REMOTELINK_UPSTREAM")]
    upstream: Option<String>,

    /// Seconds to wait for a graceful stop before forcing it
    #[arg(long)]
    shutdown_timeout: Option<u64>,

    /// Configuration file (YAML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ConnectArgs {
    /// Host ID, or host:port for a direct connection
    target: String,

    /// Relay control address used for host IDs
    #[arg(long, env = "REMOTELINK_RELAY", default_value = DEFAULT_RELAY_CONTROL_ADDR)]
    relay: String,

    /// Session password
    #[arg(long, env = "REMOTELINK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Local address the application connects to
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: String,
}

/// Setup logging with the specified log level. Logs go to stderr so stdout
/// only carries the identity line.
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    Ok(())
}

/// Load host configuration from YAML file
fn load_config_file(path: &PathBuf) -> Result<HostConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: HostConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Merge CLI args with config file, giving precedence to CLI args
fn build_host_config(args: HostArgs) -> Result<HostConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            load_config_file(path)?
        }
        None => HostConfig::default(),
    };

    if args.relay.is_some() {
        config.relay_addr = args.relay;
    }
    if let Some(host_id) = args.host_id {
        config.host_id = host_id;
    }
    if let Some(hash) = args.password_hash {
        config.password_hash = hash;
    }
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream_addr = upstream;
    }
    if let Some(secs) = args.shutdown_timeout {
        config.shutdown_timeout = Duration::from_secs(secs);
    }

    config
        .validate()
        .context("Invalid host configuration (use --upstream, --relay or a config file)")?;
    Ok(config)
}

/// Wait for SIGINT or SIGTERM
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT (Ctrl+C)"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

/// Log host events; stands in for a status display
async fn log_host_events(mut events: mpsc::Receiver<HostEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            HostEvent::StateChanged { from, to } => {
                info!(from = %from, to = %to, "Relay connection state changed")
            }
            HostEvent::IdentityAssigned { host_id } => info!(host_id = %host_id, "Host ID assigned"),
            HostEvent::RegistrationRetrying { reason, delay } => {
                warn!(reason = %reason, delay_secs = delay.as_secs(), "Relay registration retrying")
            }
            HostEvent::PasswordVerified { token, valid } => {
                info!(token = %token.short(), valid, "Client password checked")
            }
            HostEvent::TunnelActive { token } => info!(token = %token.short(), "Tunnel active"),
            HostEvent::TunnelEnded {
                token,
                bytes_to_local,
                bytes_to_relay,
                error,
            } => match error {
                Some(error) => warn!(token = %token.short(), error = %error, "Tunnel ended with error"),
                None => info!(
                    token = %token.short(),
                    bytes_to_local,
                    bytes_to_relay,
                    "Tunnel ended"
                ),
            },
        }
    }
}

async fn run_host(args: HostArgs) -> Result<()> {
    let config = build_host_config(args).context("Failed to build host configuration")?;

    match &config.relay_addr {
        Some(relay) => info!("Relay: {}", relay),
        None => info!("Direct mode, no relay configured"),
    }
    info!("Listen address: {}", config.listen_addr);
    info!("Upstream service: {}", config.upstream_addr);

    let (events, rx) = EventSink::channel(config.event_capacity);
    tokio::spawn(log_host_events(rx));

    let host = Host::start(config, events)
        .await
        .context("Failed to start host")?;

    wait_for_shutdown_signal().await?;

    info!("Shutting down...");
    if !host.shutdown().await {
        info!("Local service was already stopped");
    }
    info!("Host stopped");
    Ok(())
}

async fn run_connect(args: ConnectArgs) -> Result<()> {
    let target = ConnectTarget::classify(&args.target);
    info!("Connecting to {}", target);

    let proxy = ClientProxy::bind(&args.listen)
        .await
        .context("Failed to start local proxy")?;
    info!("Point your application at {}", proxy.local_addr());

    let serving = async {
        match target {
            ConnectTarget::Direct(addr) => {
                validate_address(&addr, "target")?;
                proxy.serve_direct(&addr, DATA_CONNECT_TIMEOUT).await?
            }
            ConnectTarget::Relay(host_id) => {
                let initiator = SessionInitiator::new(args.relay)?;
                info!("Requesting session through relay {}", initiator.relay_addr());

                let grant = match initiator.initiate(&host_id, args.password.as_deref()).await {
                    Ok(grant) => grant,
                    Err(e) => {
                        match e.kind() {
                            SessionFailure::HostNotFound => {
                                error!("Host {} is not online", host_id)
                            }
                            SessionFailure::AuthenticationFailed => {
                                error!("The host rejected the password")
                            }
                            SessionFailure::Transport | SessionFailure::Protocol => {
                                error!("Could not reach host through the relay: {}", e)
                            }
                        }
                        return Err(e.into());
                    }
                };
                proxy.serve_relay(&grant, DATA_CONNECT_TIMEOUT).await?
            }
        };
        Ok::<_, anyhow::Error>(())
    };

    tokio::select! {
        result = serving => result.context("Connection failed")?,
        result = wait_for_shutdown_signal() => result?,
    }

    info!("Connection closed");
    Ok(())
}

fn run_hash_password(password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => {
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let hash = hash_password(&password).context("Failed to hash password")?;
    println!("{}", hash);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level)?;

    match cli.command {
        Commands::Host(args) => run_host(args).await,
        Commands::Connect(args) => run_connect(args).await,
        Commands::HashPassword { password } => run_hash_password(password),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn host_args(extra: &[&str]) -> HostArgs {
        let mut argv = vec!["remotelink", "host"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Host(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    fn connect_args(extra: &[&str]) -> ConnectArgs {
        let mut argv = vec!["remotelink", "connect"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Connect(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_connect_relay_defaults() {
        if std::env::var_os("REMOTELINK_RELAY").is_some() {
            return;
        }
        let args = connect_args(&["a1b2c3d4"]);
        assert_eq!(args.relay, DEFAULT_RELAY_CONTROL_ADDR);
        assert_eq!(args.relay, "localhost:34000");

        let args = connect_args(&["a1b2c3d4", "--relay", "relay.example.com:34000"]);
        assert_eq!(args.relay, "relay.example.com:34000");
    }

    #[test]
    fn test_cli_only_config() {
        let config = build_host_config(host_args(&[
            "--upstream",
            "127.0.0.1:5900",
            "--host-id",
            "desk-1",
        ]))
        .unwrap();

        assert!(!config.is_relay_mode());
        assert_eq!(config.host_id, "desk-1");
        assert_eq!(config.listen_addr, "0.0.0.0:32212");
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
relay_addr: "relay.example.com:34000"
host_id: "from-file"
upstream_addr: "127.0.0.1:5900"
shutdown_timeout_secs: 9
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = build_host_config(host_args(&[
            "--config",
            &path,
            "--host-id",
            "from-cli",
            "--shutdown-timeout",
            "2",
        ]))
        .unwrap();

        assert_eq!(config.relay_addr.as_deref(), Some("relay.example.com:34000"));
        assert_eq!(config.host_id, "from-cli");
        assert_eq!(config.upstream_addr, "127.0.0.1:5900");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_addresses_are_rejected() {
        assert!(build_host_config(host_args(&["--upstream", "no-port"])).is_err());
        assert!(build_host_config(host_args(&[
            "--upstream",
            "127.0.0.1:5900",
            "--relay",
            "relay.example.com"
        ]))
        .is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let result = build_host_config(host_args(&["--config", "/nonexistent/host.yaml"]));
        assert!(result.is_err());
    }
}
