//! End-to-end test utilities for pgtunnel
//!
//! Harnesses for running the tunnel without a real provisioning service,
//! bastion host or database.

pub mod harness;
pub mod mock_api;
pub mod mock_db;
pub mod mock_provisioner;
pub mod mock_ssh;

pub use harness::{CapturingTerminal, RunningTunnel, TunnelHarness, TEST_ADDON};
pub use mock_api::{MockProvisioningApi, MockReply, RecordedApiRequest};
pub use mock_db::{DbServiceMode, MockDbService};
pub use mock_provisioner::{MockProvisioner, ProvisionStep};
pub use mock_ssh::{ForwardRequest, MockSshConnector, MockSshSession};
