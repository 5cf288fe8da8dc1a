//! Relay control commands
//!
//! Every line exchanged with the relay parses into one [`RelayCommand`]. The
//! first whitespace-delimited field selects the variant; the remaining fields
//! are its arguments. Passwords are the only free-form field: they take all
//! remaining fields, re-joined with single spaces.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::identity::{HostIdentity, SessionToken};

pub const REGISTER_HOST: &str = "REGISTER_HOST";
pub const HOST_REGISTERED: &str = "HOST_REGISTERED";
pub const VERIFY_PASSWORD_REQUEST: &str = "VERIFY_PASSWORD_REQUEST";
pub const VERIFY_PASSWORD_RESPONSE: &str = "VERIFY_PASSWORD_RESPONSE";
pub const CREATE_TUNNEL: &str = "CREATE_TUNNEL";
pub const INITIATE_CLIENT_SESSION: &str = "INITIATE_CLIENT_SESSION";
pub const SESSION_READY: &str = "SESSION_READY";
pub const ERROR_HOST_NOT_FOUND: &str = "ERROR_HOST_NOT_FOUND";
pub const ERROR_AUTHENTICATION_FAILED: &str = "ERROR_AUTHENTICATION_FAILED";
pub const SESSION_TOKEN: &str = "SESSION_TOKEN";

/// Errors produced while parsing a control line
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty command line")]
    Empty,

    #[error("{command} expects at least {expected} fields, found {found}")]
    MissingArguments {
        command: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid {field} for {command}: '{value}'")]
    InvalidArgument {
        command: &'static str,
        field: &'static str,
        value: String,
    },
}

/// Which end of a tunnel a data connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelRole {
    /// Host side, bridging the relay to the local service
    HostProxy,
    /// Client side, bridging a local client to the relay
    ClientProxy,
}

impl TunnelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelRole::HostProxy => "HOST_PROXY",
            TunnelRole::ClientProxy => "CLIENT_PROXY",
        }
    }
}

impl fmt::Display for TunnelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TunnelRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOST_PROXY" => Ok(TunnelRole::HostProxy),
            "CLIENT_PROXY" => Ok(TunnelRole::ClientProxy),
            _ => Err(format!("Unknown tunnel role: {}", s)),
        }
    }
}

/// A single relay control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    /// host → relay: request registration under a proposed identity
    RegisterHost { hint: HostIdentity },
    /// relay → host: final assigned identity
    HostRegistered { host_id: HostIdentity },
    /// relay → host: validate a client's password attempt
    VerifyPasswordRequest {
        token: SessionToken,
        password: String,
    },
    /// host → relay: verdict for a password attempt
    VerifyPasswordResponse { token: SessionToken, valid: bool },
    /// relay → host: open a tunnel to the relay's dynamic data port
    CreateTunnel { port: u16, token: SessionToken },
    /// client → relay: request access to a host
    InitiateClientSession {
        host_id: HostIdentity,
        password: Option<String>,
    },
    /// relay → client: tunnel is prepared on the dynamic data port
    SessionReady { port: u16, token: SessionToken },
    /// relay → client: no host registered under the requested identity
    ErrorHostNotFound,
    /// relay → client: the host rejected the password
    ErrorAuthenticationFailed,
    /// data connection identification
    IdentifySession {
        token: SessionToken,
        role: TunnelRole,
    },
    /// Anything not in the vocabulary; kept so dispatchers can log it
    Unknown { name: String, line: String },
}

impl RelayCommand {
    /// Parse one control line (without its terminator)
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&name) = parts.first() else {
            return Err(ParseError::Empty);
        };

        let command = match name {
            REGISTER_HOST => {
                require(REGISTER_HOST, &parts, 2)?;
                RelayCommand::RegisterHost {
                    hint: HostIdentity::from(parts[1]),
                }
            }
            HOST_REGISTERED => {
                require(HOST_REGISTERED, &parts, 2)?;
                RelayCommand::HostRegistered {
                    host_id: HostIdentity::from(parts[1]),
                }
            }
            VERIFY_PASSWORD_REQUEST => {
                require(VERIFY_PASSWORD_REQUEST, &parts, 2)?;
                RelayCommand::VerifyPasswordRequest {
                    token: SessionToken::from(parts[1]),
                    password: parts[2..].join(" "),
                }
            }
            VERIFY_PASSWORD_RESPONSE => {
                require(VERIFY_PASSWORD_RESPONSE, &parts, 3)?;
                let valid = match parts[2] {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(ParseError::InvalidArgument {
                            command: VERIFY_PASSWORD_RESPONSE,
                            field: "verdict",
                            value: other.to_string(),
                        })
                    }
                };
                RelayCommand::VerifyPasswordResponse {
                    token: SessionToken::from(parts[1]),
                    valid,
                }
            }
            CREATE_TUNNEL => {
                require(CREATE_TUNNEL, &parts, 3)?;
                RelayCommand::CreateTunnel {
                    port: parse_port(CREATE_TUNNEL, parts[1])?,
                    token: SessionToken::from(parts[2]),
                }
            }
            INITIATE_CLIENT_SESSION => {
                require(INITIATE_CLIENT_SESSION, &parts, 2)?;
                let password = if parts.len() > 2 {
                    Some(parts[2..].join(" "))
                } else {
                    None
                };
                RelayCommand::InitiateClientSession {
                    host_id: HostIdentity::from(parts[1]),
                    password,
                }
            }
            SESSION_READY => {
                require(SESSION_READY, &parts, 3)?;
                RelayCommand::SessionReady {
                    port: parse_port(SESSION_READY, parts[1])?,
                    token: SessionToken::from(parts[2]),
                }
            }
            ERROR_HOST_NOT_FOUND => RelayCommand::ErrorHostNotFound,
            ERROR_AUTHENTICATION_FAILED => RelayCommand::ErrorAuthenticationFailed,
            SESSION_TOKEN => {
                require(SESSION_TOKEN, &parts, 3)?;
                let role = parts[2]
                    .parse::<TunnelRole>()
                    .map_err(|_| ParseError::InvalidArgument {
                        command: SESSION_TOKEN,
                        field: "role",
                        value: parts[2].to_string(),
                    })?;
                RelayCommand::IdentifySession {
                    token: SessionToken::from(parts[1]),
                    role,
                }
            }
            other => RelayCommand::Unknown {
                name: other.to_string(),
                line: line.trim().to_string(),
            },
        };

        Ok(command)
    }

    /// Command name as it appears on the wire
    pub fn name(&self) -> &str {
        match self {
            RelayCommand::RegisterHost { .. } => REGISTER_HOST,
            RelayCommand::HostRegistered { .. } => HOST_REGISTERED,
            RelayCommand::VerifyPasswordRequest { .. } => VERIFY_PASSWORD_REQUEST,
            RelayCommand::VerifyPasswordResponse { .. } => VERIFY_PASSWORD_RESPONSE,
            RelayCommand::CreateTunnel { .. } => CREATE_TUNNEL,
            RelayCommand::InitiateClientSession { .. } => INITIATE_CLIENT_SESSION,
            RelayCommand::SessionReady { .. } => SESSION_READY,
            RelayCommand::ErrorHostNotFound => ERROR_HOST_NOT_FOUND,
            RelayCommand::ErrorAuthenticationFailed => ERROR_AUTHENTICATION_FAILED,
            RelayCommand::IdentifySession { .. } => SESSION_TOKEN,
            RelayCommand::Unknown { name, .. } => name,
        }
    }

    /// Wire form including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }

    /// Fields that must be single whitespace-free tokens, and the optional
    /// free-form trailing field. Used by the encoder to reject lines that
    /// would not parse back.
    pub(crate) fn fields(&self) -> (Vec<&str>, Option<&str>) {
        match self {
            RelayCommand::RegisterHost { hint } => (vec![hint.as_str()], None),
            RelayCommand::HostRegistered { host_id } => (vec![host_id.as_str()], None),
            RelayCommand::VerifyPasswordRequest { token, password } => {
                (vec![token.as_str()], Some(password.as_str()))
            }
            RelayCommand::VerifyPasswordResponse { token, .. } => (vec![token.as_str()], None),
            RelayCommand::CreateTunnel { token, .. } => (vec![token.as_str()], None),
            RelayCommand::InitiateClientSession { host_id, password } => {
                (vec![host_id.as_str()], password.as_deref())
            }
            RelayCommand::SessionReady { token, .. } => (vec![token.as_str()], None),
            RelayCommand::IdentifySession { token, .. } => (vec![token.as_str()], None),
            RelayCommand::ErrorHostNotFound
            | RelayCommand::ErrorAuthenticationFailed
            | RelayCommand::Unknown { .. } => (Vec::new(), None),
        }
    }
}

impl fmt::Display for RelayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayCommand::RegisterHost { hint } => write!(f, "{} {}", REGISTER_HOST, hint),
            RelayCommand::HostRegistered { host_id } => {
                write!(f, "{} {}", HOST_REGISTERED, host_id)
            }
            RelayCommand::VerifyPasswordRequest { token, password } => {
                if password.is_empty() {
                    write!(f, "{} {}", VERIFY_PASSWORD_REQUEST, token)
                } else {
                    write!(f, "{} {} {}", VERIFY_PASSWORD_REQUEST, token, password)
                }
            }
            RelayCommand::VerifyPasswordResponse { token, valid } => {
                write!(f, "{} {} {}", VERIFY_PASSWORD_RESPONSE, token, valid)
            }
            RelayCommand::CreateTunnel { port, token } => {
                write!(f, "{} {} {}", CREATE_TUNNEL, port, token)
            }
            RelayCommand::InitiateClientSession { host_id, password } => match password {
                Some(password) if !password.is_empty() => {
                    write!(f, "{} {} {}", INITIATE_CLIENT_SESSION, host_id, password)
                }
                _ => write!(f, "{} {}", INITIATE_CLIENT_SESSION, host_id),
            },
            RelayCommand::SessionReady { port, token } => {
                write!(f, "{} {} {}", SESSION_READY, port, token)
            }
            RelayCommand::ErrorHostNotFound => f.write_str(ERROR_HOST_NOT_FOUND),
            RelayCommand::ErrorAuthenticationFailed => f.write_str(ERROR_AUTHENTICATION_FAILED),
            RelayCommand::IdentifySession { token, role } => {
                write!(f, "{} {} {}", SESSION_TOKEN, token, role)
            }
            RelayCommand::Unknown { line, .. } => f.write_str(line),
        }
    }
}

impl FromStr for RelayCommand {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelayCommand::parse(s)
    }
}

fn require(command: &'static str, parts: &[&str], expected: usize) -> Result<(), ParseError> {
    if parts.len() < expected {
        return Err(ParseError::MissingArguments {
            command,
            expected,
            found: parts.len(),
        });
    }
    Ok(())
}

fn parse_port(command: &'static str, value: &str) -> Result<u16, ParseError> {
    value.parse::<u16>().map_err(|_| ParseError::InvalidArgument {
        command,
        field: "port",
        value: value.to_string(),
    })
}
