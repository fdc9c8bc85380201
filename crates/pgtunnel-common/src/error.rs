use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while talking to the credential provisioning service
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Add-on {addon} was not found or is not a Borealis Isolated Postgres add-on")]
    NotFound { addon: String },

    #[error("Add-on {addon} is not finished provisioning")]
    NotReady { addon: String },

    /// Any other status code, transport failure or malformed payload.
    /// `reason` is only logged, never shown to the operator.
    #[error("Add-on service is temporarily unavailable. Try again later.")]
    Unavailable { reason: String },

    #[error("Log in to the platform CLI first!")]
    NotLoggedIn,

    #[error("Failed to obtain a temporary auth token: {0}")]
    AuthToken(String),
}

impl ProvisionError {
    /// Classify a non-success HTTP status from the add-on API
    pub fn from_status(addon: &str, status: u16, reason: impl Into<String>) -> Self {
        match status {
            404 => Self::NotFound {
                addon: addon.to_string(),
            },
            422 => Self::NotReady {
                addon: addon.to_string(),
            },
            _ => Self::unavailable(format!("HTTP {}: {}", status, reason.into())),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Errors for tunnel operations
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Invalid pinned host key: {0}")]
    InvalidHostKey(String),

    #[error("Host key presented by {host} does not match the pinned host key")]
    HostKeyMismatch { host: String },

    #[error("Invalid SSH private key: {0}")]
    PrivateKey(String),

    #[error("SSH connection to {host}:{port} failed: {message}")]
    SshConnect {
        host: String,
        port: u16,
        message: String,
    },

    #[error("SSH authentication rejected for user {username}")]
    SshAuth { username: String },

    #[error("SSH session is not ready (state: {state})")]
    SessionNotReady { state: &'static str },

    #[error("Failed to forward connection to {host}:{port}: {message}")]
    Forward {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Local port {port} is already in use")]
    LocalPortInUse { port: u16 },

    #[error("Failed to listen on local port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    #[error("Socket error on connection from {peer}: {source}")]
    Socket {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Forwarded stream error on connection from {peer}: {source}")]
    ForwardedStream {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl TunnelError {
    /// Classify a bind failure for `port`
    pub fn bind(port: u16, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            Self::LocalPortInUse { port }
        } else {
            Self::Bind { port, source }
        }
    }

    /// True for an abrupt close by the local client (expected, recoverable)
    pub fn is_client_reset(&self) -> bool {
        matches!(
            self,
            Self::Socket { source, .. } if source.kind() == io::ErrorKind::ConnectionReset
        )
    }
}
