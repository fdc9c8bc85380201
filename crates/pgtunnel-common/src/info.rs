use std::fmt;

use serde::{Deserialize, Deserializer};

/// SSH port used when the provisioning response leaves it out
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Postgres port used when the provisioning response leaves it out, and the
/// default local listen port
pub const DEFAULT_PG_PORT: u16 = 5432;

/// The only address the local proxy listens on
pub const LOCAL_PG_HOSTNAME: &str = "localhost";

/// Database access requested by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn from_write_access(write_access: bool) -> Self {
        if write_access {
            Self::ReadWrite
        } else {
            Self::ReadOnly
        }
    }

    pub fn allows_writes(self) -> bool {
        self == Self::ReadWrite
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read/write"),
        }
    }
}

/// Ephemeral SSH login for the bastion host
#[derive(Clone, Deserialize)]
pub struct SshConnectionInfo {
    #[serde(rename = "sshHost")]
    pub host: String,

    #[serde(
        rename = "sshPort",
        default = "default_ssh_port",
        deserialize_with = "ssh_port_or_default"
    )]
    pub port: u16,

    #[serde(rename = "sshUsername")]
    pub username: String,

    /// OpenSSH/PEM private key material
    #[serde(rename = "sshPrivateKey")]
    pub private_key: String,

    /// Pinned host key entry, e.g. `ssh-ed25519 AAAA...`
    #[serde(rename = "publicSshHostKey")]
    pub host_key: String,
}

/// Ephemeral database login, reached through the SSH session
#[derive(Clone, Deserialize)]
pub struct DbConnectionInfo {
    #[serde(rename = "dbHost")]
    pub host: String,

    #[serde(
        rename = "dbPort",
        default = "default_pg_port",
        deserialize_with = "pg_port_or_default"
    )]
    pub port: u16,

    #[serde(rename = "dbName")]
    pub database: String,

    #[serde(rename = "dbUsername")]
    pub username: String,

    #[serde(rename = "dbPassword")]
    pub password: String,

    /// Not part of the payload; set from the request that produced it
    #[serde(skip)]
    pub access_mode: AccessMode,
}

impl DbConnectionInfo {
    /// Connection URL for a client talking to the local end of the tunnel
    pub fn local_url(&self, local_port: u16) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, LOCAL_PG_HOSTNAME, local_port, self.database
        )
    }
}

// Credentials stay out of logs
impl fmt::Debug for SshConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("private_key", &"<redacted>")
            .field("host_key", &self.host_key)
            .finish()
    }
}

impl fmt::Debug for DbConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("access_mode", &self.access_mode)
            .finish()
    }
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_pg_port() -> u16 {
    DEFAULT_PG_PORT
}

fn ssh_port_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    Ok(Option::<u16>::deserialize(deserializer)?.unwrap_or(DEFAULT_SSH_PORT))
}

fn pg_port_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    Ok(Option::<u16>::deserialize(deserializer)?.unwrap_or(DEFAULT_PG_PORT))
}
