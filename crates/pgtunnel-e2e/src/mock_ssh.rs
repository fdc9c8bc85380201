//! Mock SSH connector for E2E tests
//!
//! Sessions open "channels" as real TCP connections straight to the requested
//! remote address, so the listener and pump run unchanged against a local
//! mock database.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpStream;

use pgtunnel::{ForwardedIo, SessionState, SessionStateCell, SshConnector, SshSession};
use pgtunnel_common::{SshConnectionInfo, TunnelError};

/// One `forward` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRequest {
    pub origin_host: String,
    pub origin_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

/// Mock SSH session
#[derive(Default)]
pub struct MockSshSession {
    state: SessionStateCell,
    forwards: Mutex<Vec<ForwardRequest>>,
    closes: AtomicUsize,
    fail_forward: AtomicBool,
}

impl MockSshSession {
    fn connected() -> Arc<Self> {
        let session = Self::default();
        session
            .state
            .transition(SessionState::Unconnected, SessionState::Connecting);
        session
            .state
            .transition(SessionState::Connecting, SessionState::Ready);
        Arc::new(session)
    }

    /// All `forward` calls so far, including failed ones
    pub fn forwards(&self) -> Vec<ForwardRequest> {
        self.forwards.lock().clone()
    }

    /// Times `close` actually disconnected
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make subsequent `forward` calls fail as if the server refused the channel
    pub fn set_fail_forward(&self, fail: bool) {
        self.fail_forward.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SshSession for MockSshSession {
    async fn forward(
        &self,
        origin_host: &str,
        origin_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Box<dyn ForwardedIo>, TunnelError> {
        self.state.ensure_ready()?;

        self.forwards.lock().push(ForwardRequest {
            origin_host: origin_host.to_string(),
            origin_port,
            remote_host: remote_host.to_string(),
            remote_port,
        });

        let forward_err = |message: String| TunnelError::Forward {
            host: remote_host.to_string(),
            port: remote_port,
            message,
        };

        if self.fail_forward.load(Ordering::SeqCst) {
            return Err(forward_err("Simulated channel open failure".to_string()));
        }

        let stream = TcpStream::connect((remote_host, remote_port))
            .await
            .map_err(|e| forward_err(e.to_string()))?;
        Ok(Box::new(stream))
    }

    async fn close(&self) {
        if self.state.close() {
            self.closes.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("MockSshSession: closed");
        }
    }

    fn state(&self) -> SessionState {
        self.state.get()
    }
}

/// Mock SSH connector that records what it was asked to connect to
#[derive(Default)]
pub struct MockSshConnector {
    connections: Mutex<Vec<SshConnectionInfo>>,
    sessions: Mutex<Vec<Arc<MockSshSession>>>,
    fail_connect: AtomicBool,
    reject_host_key: AtomicBool,
    fail_forward: AtomicBool,
}

impl MockSshConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `connect` calls, successful or not
    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Connection details passed to `connect`
    pub fn connections(&self) -> Vec<SshConnectionInfo> {
        self.connections.lock().clone()
    }

    /// The most recently created session
    pub fn last_session(&self) -> Option<Arc<MockSshSession>> {
        self.sessions.lock().last().cloned()
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_reject_host_key(&self, reject: bool) {
        self.reject_host_key.store(reject, Ordering::SeqCst);
    }

    /// Sessions created from now on refuse to open channels
    pub fn set_fail_forward(&self, fail: bool) {
        self.fail_forward.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SshConnector for MockSshConnector {
    async fn connect(&self, info: &SshConnectionInfo) -> Result<Arc<dyn SshSession>, TunnelError> {
        self.connections.lock().push(info.clone());

        if self.reject_host_key.load(Ordering::SeqCst) {
            return Err(TunnelError::HostKeyMismatch {
                host: info.host.clone(),
            });
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TunnelError::SshConnect {
                host: info.host.clone(),
                port: info.port,
                message: "Simulated connection failure".to_string(),
            });
        }

        let session = MockSshSession::connected();
        session.set_fail_forward(self.fail_forward.load(Ordering::SeqCst));
        self.sessions.lock().push(session.clone());
        tracing::debug!("MockSshConnector: connected to {}:{}", info.host, info.port);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let session = MockSshSession::connected();
        assert_eq!(session.state(), SessionState::Ready);

        session.close().await;
        session.close().await;
        assert_eq!(session.close_count(), 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_forward_after_close_is_rejected() {
        let session = MockSshSession::connected();
        session.close().await;

        let result = session.forward("localhost", 5432, "127.0.0.1", 1).await;
        assert!(matches!(
            result,
            Err(TunnelError::SessionNotReady { state: "closed" })
        ));
        assert!(session.forwards().is_empty());
    }
}
