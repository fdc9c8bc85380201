//! Tunnel lifecycle
//!
//! provision credentials (token revoked before returning) -> bind the local
//! port -> open the SSH session -> show instructions -> serve until the
//! operator interrupts or a connection fails.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pgtunnel_common::{AccessMode, TunnelError};
use pgtunnel_provision::{provision_credentials, CredentialProvisioner, Credentials};

use crate::instructions::{ConnectionInstructions, Terminal};
use crate::listener::{ForwardTarget, ListenerFactory, ProxyListener};
use crate::signal::ShutdownSignal;
use crate::ssh::SshConnector;

/// What the operator asked for
#[derive(Debug, Clone)]
pub struct TunnelOptions {
    pub addon: String,
    pub local_port: u16,
    pub access_mode: AccessMode,
}

/// Progress of a tunnel run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TunnelPhase {
    Provisioned,
    Listening,
    Connected,
    Serving,
}

/// State of the single tunnel in this process
#[derive(Debug)]
pub struct TunnelSession {
    credentials: Credentials,
    local_port: Option<u16>,
    phase: TunnelPhase,
}

impl TunnelSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            local_port: None,
            phase: TunnelPhase::Provisioned,
        }
    }

    pub fn phase(&self) -> TunnelPhase {
        self.phase
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    pub fn listening(&mut self, local_port: u16) {
        self.local_port = Some(local_port);
        self.advance(TunnelPhase::Listening);
    }

    pub fn advance(&mut self, next: TunnelPhase) {
        debug_assert!(next > self.phase, "tunnel phase went from {:?} to {:?}", self.phase, next);
        tracing::debug!("Tunnel phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Instructions for the local end; `None` until a port is bound
    pub fn instructions(&self) -> Option<ConnectionInstructions> {
        self.local_port
            .map(|port| ConnectionInstructions::new(&self.credentials.db, port))
    }

    fn forward_target(&self) -> ForwardTarget {
        ForwardTarget {
            host: self.credentials.db.host.clone(),
            port: self.credentials.db.port,
        }
    }
}

/// Runs one tunnel from provisioning to shutdown
pub struct TunnelController {
    provisioner: Arc<dyn CredentialProvisioner>,
    connector: Arc<dyn SshConnector>,
    listeners: Arc<dyn ListenerFactory>,
    terminal: Arc<dyn Terminal>,
}

impl TunnelController {
    pub fn new(
        provisioner: Arc<dyn CredentialProvisioner>,
        connector: Arc<dyn SshConnector>,
        listeners: Arc<dyn ListenerFactory>,
        terminal: Arc<dyn Terminal>,
    ) -> Self {
        Self {
            provisioner,
            connector,
            listeners,
            terminal,
        }
    }

    /// Run until `signal` fires (Ok) or something fails (Err).
    ///
    /// A signal during provisioning takes effect once provisioning, including
    /// token revocation, has finished.
    pub async fn run<S>(&self, options: &TunnelOptions, signal: S) -> Result<(), TunnelError>
    where
        S: ShutdownSignal + 'static,
    {
        let shutdown = CancellationToken::new();
        let watcher = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                signal.recv().await;
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            })
        };

        let result = self.run_until(options, &shutdown).await;
        watcher.abort();

        match &result {
            Ok(()) => tracing::info!("Tunnel closed"),
            Err(e) => tracing::error!("Tunnel failed: {}", e),
        }
        result
    }

    async fn run_until(
        &self,
        options: &TunnelOptions,
        shutdown: &CancellationToken,
    ) -> Result<(), TunnelError> {
        tracing::info!(
            "Provisioning {} access to add-on {}",
            options.access_mode,
            options.addon
        );
        let credentials =
            provision_credentials(self.provisioner.as_ref(), &options.addon, options.access_mode)
                .await?;
        let mut session = TunnelSession::new(credentials);

        if shutdown.is_cancelled() {
            return Ok(());
        }

        let listener = ProxyListener::start(self.listeners.as_ref(), options.local_port).await?;
        session.listening(listener.port());

        let ssh = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            result = self.connector.connect(&session.credentials().ssh) => result?,
        };
        session.advance(TunnelPhase::Connected);

        if let Some(instructions) = session.instructions() {
            self.terminal.show_instructions(&instructions);
        }
        session.advance(TunnelPhase::Serving);

        let result = listener
            .serve(ssh.clone(), session.forward_target(), shutdown.clone())
            .await;
        ssh.close().await;
        result
    }
}
