//! Tunnel harness for E2E tests
//!
//! Runs a real `TunnelController` with a mock provisioner, a mock SSH
//! connector and a mock database, listening on an ephemeral local port.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pgtunnel::{
    ConnectionInstructions, ListenerFactory, LocalhostListenerFactory, Terminal, TunnelController,
    TunnelOptions,
};
use pgtunnel_common::{AccessMode, TunnelError};

use crate::mock_db::{DbServiceMode, MockDbService};
use crate::mock_provisioner::MockProvisioner;
use crate::mock_ssh::MockSshConnector;

pub const TEST_ADDON: &str = "borealis-pg-my-fake-addon";

/// Terminal that keeps what it was asked to show
#[derive(Default)]
pub struct CapturingTerminal {
    shown: Mutex<Vec<ConnectionInstructions>>,
    notify: Notify,
}

impl CapturingTerminal {
    pub fn shown(&self) -> Vec<ConnectionInstructions> {
        self.shown.lock().clone()
    }

    /// Wait until instructions have been shown, up to `timeout`
    pub async fn wait_for_instructions(&self, timeout: Duration) -> Option<ConnectionInstructions> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if let Some(instructions) = self.shown.lock().last().cloned() {
                    return instructions;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }
}

impl Terminal for CapturingTerminal {
    fn show_instructions(&self, instructions: &ConnectionInstructions) {
        self.shown.lock().push(instructions.clone());
        self.notify.notify_waiters();
    }
}

/// Mocks wired into one controller
pub struct TunnelHarness {
    pub db: MockDbService,
    pub provisioner: Arc<MockProvisioner>,
    pub connector: Arc<MockSshConnector>,
    pub terminal: Arc<CapturingTerminal>,
}

impl TunnelHarness {
    pub async fn start() -> Self {
        Self::start_with_mode(DbServiceMode::Echo).await
    }

    pub async fn start_with_mode(mode: DbServiceMode) -> Self {
        let db = MockDbService::start_with_mode(mode).await;
        let provisioner = MockProvisioner::new(db.addr());

        Self {
            db,
            provisioner,
            connector: MockSshConnector::new(),
            terminal: Arc::new(CapturingTerminal::default()),
        }
    }

    pub fn controller(&self) -> TunnelController {
        TunnelController::new(
            self.provisioner.clone(),
            self.connector.clone(),
            Arc::new(LocalhostListenerFactory) as Arc<dyn ListenerFactory>,
            self.terminal.clone(),
        )
    }

    /// Options for a read-only tunnel on an ephemeral port
    pub fn options(&self) -> TunnelOptions {
        TunnelOptions {
            addon: TEST_ADDON.to_string(),
            local_port: 0,
            access_mode: AccessMode::ReadOnly,
        }
    }

    /// Run the controller in the background
    pub fn spawn(&self, options: TunnelOptions) -> RunningTunnel {
        let interrupt = CancellationToken::new();
        let controller = self.controller();
        let signal = interrupt.clone();

        let handle = tokio::spawn(async move { controller.run(&options, signal).await });

        RunningTunnel {
            interrupt,
            handle,
            terminal: self.terminal.clone(),
        }
    }
}

/// A controller running in a background task
pub struct RunningTunnel {
    interrupt: CancellationToken,
    handle: JoinHandle<Result<(), TunnelError>>,
    terminal: Arc<CapturingTerminal>,
}

impl RunningTunnel {
    /// Wait for the tunnel to print its instructions
    pub async fn ready(&self) -> ConnectionInstructions {
        self.terminal
            .wait_for_instructions(Duration::from_secs(5))
            .await
            .expect("Tunnel did not become ready")
    }

    /// Local address clients should connect to
    pub async fn local_addr(&self) -> String {
        let instructions = self.ready().await;
        format!("{}:{}", instructions.host, instructions.port)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Simulate Ctrl+C
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    /// Wait for the run to end
    pub async fn join(self) -> Result<(), TunnelError> {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("Tunnel did not stop in time")
            .expect("Tunnel task panicked")
    }
}
