//! Operator-facing rendering of fatal errors

use pgtunnel_common::{ProvisionError, TunnelError};

/// A fatal error with a stable code and, where it helps, a next step
#[derive(Debug, miette::Diagnostic, thiserror::Error)]
pub enum TunnelDiagnostic {
    #[error("{message}")]
    #[diagnostic(
        code(pgtunnel::provision::not_found),
        severity(error),
        help("Check the add-on name, or use the add-on's attachment name.")
    )]
    AddonNotFound { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(pgtunnel::provision::not_ready),
        severity(error),
        help("Wait for the add-on to finish provisioning, then try again.")
    )]
    AddonNotReady { message: String },

    #[error("{message}")]
    #[diagnostic(code(pgtunnel::provision::unavailable), severity(error))]
    ServiceUnavailable { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(pgtunnel::provision::not_logged_in),
        severity(error),
        help("Set PGTUNNEL_API_TOKEN or api_token in the config file to a valid platform API token.")
    )]
    NotLoggedIn { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(pgtunnel::provision::auth_token),
        severity(error),
        help("Check that your platform API token is valid and not expired.")
    )]
    AuthToken { message: String },

    #[error("{message}")]
    #[diagnostic(code(pgtunnel::ssh::invalid_credentials), severity(error))]
    InvalidSshCredentials { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(pgtunnel::ssh::host_key_mismatch),
        severity(error),
        help("The bastion host could not prove its identity. Do not retry until the cause is known.")
    )]
    HostKeyMismatch { message: String },

    #[error("{message}")]
    #[diagnostic(code(pgtunnel::ssh::connect), severity(error))]
    SshConnect { message: String },

    #[error("{message}")]
    #[diagnostic(code(pgtunnel::ssh::forward), severity(error))]
    Forward { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(pgtunnel::listen::port_in_use),
        severity(error),
        help("Choose a different local port with --port.")
    )]
    PortInUse { message: String },

    #[error("{message}")]
    #[diagnostic(code(pgtunnel::listen::failed), severity(error))]
    Listen { message: String },

    #[error("{message}")]
    #[diagnostic(code(pgtunnel::connection::io), severity(error))]
    Connection { message: String },
}

impl TunnelDiagnostic {
    /// Pretty-print to stderr
    pub fn report(self) {
        eprintln!("{:?}", miette::Report::new(self));
    }
}

impl From<&TunnelError> for TunnelDiagnostic {
    fn from(err: &TunnelError) -> Self {
        let message = err.to_string();
        match err {
            TunnelError::Provision(p) => match p {
                ProvisionError::NotFound { .. } => Self::AddonNotFound { message },
                ProvisionError::NotReady { .. } => Self::AddonNotReady { message },
                ProvisionError::Unavailable { reason } => {
                    tracing::debug!("Add-on service failure: {}", reason);
                    Self::ServiceUnavailable { message }
                }
                ProvisionError::NotLoggedIn => Self::NotLoggedIn { message },
                ProvisionError::AuthToken(_) => Self::AuthToken { message },
            },
            TunnelError::InvalidHostKey(_) | TunnelError::PrivateKey(_) => {
                Self::InvalidSshCredentials { message }
            }
            TunnelError::HostKeyMismatch { .. } => Self::HostKeyMismatch { message },
            TunnelError::SshConnect { .. }
            | TunnelError::SshAuth { .. }
            | TunnelError::SessionNotReady { .. } => Self::SshConnect { message },
            TunnelError::Forward { .. } => Self::Forward { message },
            TunnelError::LocalPortInUse { .. } => Self::PortInUse { message },
            TunnelError::Bind { .. } | TunnelError::Accept(_) => Self::Listen { message },
            TunnelError::Socket { .. } | TunnelError::ForwardedStream { .. } => {
                Self::Connection { message }
            }
        }
    }
}
