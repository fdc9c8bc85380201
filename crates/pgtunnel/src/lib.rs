//! pgtunnel - local Postgres access to an isolated add-on over SSH
//!
//! Provisions short-lived SSH and database users, opens an SSH session pinned
//! to the bastion's host key, and forwards every connection made to a local
//! port through that session to the database.

pub mod config;
pub mod diagnostic;
pub mod instructions;
pub mod lifecycle;
pub mod listener;
pub mod port;
pub mod pump;
pub mod signal;
pub mod ssh;

pub use diagnostic::TunnelDiagnostic;
pub use instructions::{ConnectionInstructions, StdoutTerminal, Terminal};
pub use lifecycle::{TunnelController, TunnelOptions, TunnelPhase, TunnelSession};
pub use listener::{ForwardTarget, ListenerFactory, LocalhostListenerFactory, ProxyListener};
pub use port::{parse_port, PortError};
pub use pump::{pump, PumpStats};
pub use signal::{OsSignals, ShutdownSignal};
pub use ssh::{
    ForwardedIo, RusshConnector, SessionState, SessionStateCell, SshConnector, SshSession,
};
