mod error;
mod hostkey;
mod info;

pub use error::{ProvisionError, TunnelError};
pub use hostkey::{OfferedHostKey, PinnedHostKey};
pub use info::{
    AccessMode, DbConnectionInfo, SshConnectionInfo, DEFAULT_PG_PORT, DEFAULT_SSH_PORT,
    LOCAL_PG_HOSTNAME,
};
