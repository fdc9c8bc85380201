//! Credential provisioner abstraction
//!
//! This trait allows the tunnel to work against the real add-on API or an
//! in-memory implementation for testing.

use async_trait::async_trait;
use pgtunnel_common::{AccessMode, DbConnectionInfo, ProvisionError, SshConnectionInfo};

/// Short-lived platform authorization used to call the add-on API
#[derive(Clone)]
pub struct AuthToken {
    /// Authorization ID, needed to revoke it
    pub id: String,
    /// Bearer token. Missing when the operator is not logged in.
    pub access_token: Option<String>,
}

impl AuthToken {
    pub fn bearer(&self) -> Result<&str, ProvisionError> {
        self.access_token
            .as_deref()
            .ok_or(ProvisionError::NotLoggedIn)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("id", &self.id)
            .field("has_access_token", &self.access_token.is_some())
            .finish()
    }
}

/// Trait for credential provisioning backends
#[async_trait]
pub trait CredentialProvisioner: Send + Sync {
    /// Issue a temporary auth token for the add-on API
    async fn create_auth_token(&self) -> Result<AuthToken, ProvisionError>;

    /// Revoke a token issued by [`create_auth_token`](Self::create_auth_token)
    async fn revoke_auth_token(&self, token: &AuthToken) -> Result<(), ProvisionError>;

    /// Create an ad-hoc SSH user on the add-on's bastion host
    async fn create_ssh_user(
        &self,
        token: &AuthToken,
        addon: &str,
    ) -> Result<SshConnectionInfo, ProvisionError>;

    /// Create an ad-hoc database user with the requested access
    async fn create_db_user(
        &self,
        token: &AuthToken,
        addon: &str,
        access_mode: AccessMode,
    ) -> Result<DbConnectionInfo, ProvisionError>;
}

/// Credentials for one tunnel run
#[derive(Debug, Clone)]
pub struct Credentials {
    pub ssh: SshConnectionInfo,
    pub db: DbConnectionInfo,
}

/// Fetch SSH then DB credentials under a temporary auth token.
///
/// Once the token has been issued it is revoked exactly once, whether the
/// fetches succeed or fail. A failed revocation is logged and does not mask
/// the fetch result; the token expires on its own shortly after.
pub async fn provision_credentials<P>(
    provisioner: &P,
    addon: &str,
    access_mode: AccessMode,
) -> Result<Credentials, ProvisionError>
where
    P: CredentialProvisioner + ?Sized,
{
    let token = provisioner.create_auth_token().await?;
    tracing::debug!(token_id = %token.id, "Issued temporary auth token");

    let result = fetch_credentials(provisioner, &token, addon, access_mode).await;

    match provisioner.revoke_auth_token(&token).await {
        Ok(()) => tracing::debug!(token_id = %token.id, "Revoked temporary auth token"),
        Err(e) => tracing::warn!(token_id = %token.id, "Failed to revoke temporary auth token: {}", e),
    }

    result
}

async fn fetch_credentials<P>(
    provisioner: &P,
    token: &AuthToken,
    addon: &str,
    access_mode: AccessMode,
) -> Result<Credentials, ProvisionError>
where
    P: CredentialProvisioner + ?Sized,
{
    token.bearer()?;

    tracing::info!("Creating SSH user for add-on {}", addon);
    let ssh = provisioner.create_ssh_user(token, addon).await?;

    tracing::info!("Creating {} database user for add-on {}", access_mode, addon);
    let mut db = provisioner.create_db_user(token, addon, access_mode).await?;
    db.access_mode = access_mode;

    Ok(Credentials { ssh, db })
}
