//! In-memory credential provisioner for E2E tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use pgtunnel_common::{AccessMode, DbConnectionInfo, ProvisionError, SshConnectionInfo};
use pgtunnel_provision::{AuthToken, CredentialProvisioner};

pub const FAKE_SSH_HOST: &str = "my-fake-ssh-hostname";
pub const FAKE_SSH_USERNAME: &str = "ssh-test-user";
pub const FAKE_SSH_PRIVATE_KEY: &str = "my-fake-ssh-private-key";
pub const FAKE_SSH_HOST_KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIKkk9uh8+g/gKlLlbi4sVv4VJkiaLjYOJj+wVVyTGzhI";
pub const FAKE_DB_NAME: &str = "fake_db";
pub const FAKE_DB_READONLY_USERNAME: &str = "ro_db_test_user";
pub const FAKE_DB_READWRITE_USERNAME: &str = "rw_db_test_user";
pub const FAKE_DB_PASSWORD: &str = "my-fake-db-password";

/// A provisioning step that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    AuthToken,
    SshUser,
    DbUser,
    Revoke,
}

/// Mock provisioner whose database credentials point at a local address
pub struct MockProvisioner {
    db_addr: SocketAddr,
    failing_step: Mutex<Option<ProvisionStep>>,
    no_access_token: AtomicBool,
    tokens_issued: AtomicUsize,
    revocations: AtomicUsize,
    db_requests: Mutex<Vec<AccessMode>>,
}

impl MockProvisioner {
    pub fn new(db_addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            db_addr,
            failing_step: Mutex::new(None),
            no_access_token: AtomicBool::new(false),
            tokens_issued: AtomicUsize::new(0),
            revocations: AtomicUsize::new(0),
            db_requests: Mutex::new(Vec::new()),
        })
    }

    /// Fail the given step (only one at a time)
    pub fn set_failing_step(&self, step: Option<ProvisionStep>) {
        *self.failing_step.lock() = step;
    }

    /// Issue tokens without an access token, as for a logged-out operator
    pub fn set_no_access_token(&self, missing: bool) {
        self.no_access_token.store(missing, Ordering::SeqCst);
    }

    pub fn tokens_issued(&self) -> usize {
        self.tokens_issued.load(Ordering::SeqCst)
    }

    pub fn revocations(&self) -> usize {
        self.revocations.load(Ordering::SeqCst)
    }

    /// Access modes requested for database users, in order
    pub fn db_requests(&self) -> Vec<AccessMode> {
        self.db_requests.lock().clone()
    }

    fn check(&self, step: ProvisionStep) -> Result<(), ProvisionError> {
        if *self.failing_step.lock() == Some(step) {
            return Err(ProvisionError::unavailable(format!(
                "Simulated {:?} failure",
                step
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialProvisioner for MockProvisioner {
    async fn create_auth_token(&self) -> Result<AuthToken, ProvisionError> {
        self.check(ProvisionStep::AuthToken)?;

        let n = self.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access_token =
            (!self.no_access_token.load(Ordering::SeqCst)).then(|| format!("mock-token-{}", n));
        Ok(AuthToken {
            id: format!("mock-auth-{}", n),
            access_token,
        })
    }

    async fn revoke_auth_token(&self, token: &AuthToken) -> Result<(), ProvisionError> {
        self.revocations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("MockProvisioner: revoked {}", token.id);
        self.check(ProvisionStep::Revoke)
    }

    async fn create_ssh_user(
        &self,
        _token: &AuthToken,
        _addon: &str,
    ) -> Result<SshConnectionInfo, ProvisionError> {
        self.check(ProvisionStep::SshUser)?;

        Ok(SshConnectionInfo {
            host: FAKE_SSH_HOST.to_string(),
            port: 22,
            username: FAKE_SSH_USERNAME.to_string(),
            private_key: FAKE_SSH_PRIVATE_KEY.to_string(),
            host_key: FAKE_SSH_HOST_KEY.to_string(),
        })
    }

    async fn create_db_user(
        &self,
        _token: &AuthToken,
        _addon: &str,
        access_mode: AccessMode,
    ) -> Result<DbConnectionInfo, ProvisionError> {
        self.db_requests.lock().push(access_mode);
        self.check(ProvisionStep::DbUser)?;

        let username = if access_mode.allows_writes() {
            FAKE_DB_READWRITE_USERNAME
        } else {
            FAKE_DB_READONLY_USERNAME
        };

        Ok(DbConnectionInfo {
            host: self.db_addr.ip().to_string(),
            port: self.db_addr.port(),
            database: FAKE_DB_NAME.to_string(),
            username: username.to_string(),
            password: FAKE_DB_PASSWORD.to_string(),
            access_mode,
        })
    }
}
