//! Local TCP listener that forwards each client through the SSH session

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pgtunnel_common::{TunnelError, DEFAULT_PG_PORT, LOCAL_PG_HOSTNAME};

use crate::pump::pump;
use crate::ssh::SshSession;

/// Creates the local listening socket
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn bind(&self, port: u16) -> io::Result<TcpListener>;
}

/// Binds the first address `localhost` resolves to, never a wildcard address
#[derive(Debug, Default, Clone)]
pub struct LocalhostListenerFactory;

#[async_trait]
impl ListenerFactory for LocalhostListenerFactory {
    async fn bind(&self, port: u16) -> io::Result<TcpListener> {
        let addr = tokio::net::lookup_host((LOCAL_PG_HOSTNAME, port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} did not resolve to any address", LOCAL_PG_HOSTNAME),
                )
            })?;

        TcpListener::bind(addr).await
    }
}

/// Database endpoint as seen from the bastion host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub host: String,
    pub port: u16,
}

/// A bound local listener, not yet accepting
pub struct ProxyListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ProxyListener {
    /// Bind the local port. An occupied port yields `LocalPortInUse`.
    pub async fn start(factory: &dyn ListenerFactory, port: u16) -> Result<Self, TunnelError> {
        let listener = factory
            .bind(port)
            .await
            .map_err(|e| TunnelError::bind(port, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TunnelError::bind(port, e))?;

        tracing::info!("Listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Accept and forward connections until `shutdown` fires or a connection
    /// fails in a way that should end the run.
    ///
    /// Each connection runs in its own task. A client reset only ends that
    /// connection; any other per-connection error is handed back here and
    /// returned. Open connections are cancelled when this returns.
    pub async fn serve(
        self,
        session: Arc<dyn SshSession>,
        target: ForwardTarget,
        shutdown: CancellationToken,
    ) -> Result<(), TunnelError> {
        let (error_tx, mut error_rx) = mpsc::unbounded_channel::<TunnelError>();
        let connections = shutdown.child_token();
        let _cancel_connections = connections.clone().drop_guard();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Listener on {} stopping", self.local_addr);
                    return Ok(());
                }
                Some(err) = error_rx.recv() => {
                    tracing::error!("Connection failed: {}", err);
                    return Err(err);
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(TunnelError::Accept)?;
                    tracing::debug!("Accepted connection from {}", peer);

                    let session = session.clone();
                    let target = target.clone();
                    let error_tx = error_tx.clone();
                    let cancelled = connections.clone();

                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancelled.cancelled() => {
                                tracing::debug!("Connection from {} cancelled", peer);
                            }
                            result = handle_connection(session.as_ref(), &target, stream, peer) => {
                                match result {
                                    Ok(()) => {}
                                    Err(e) if e.is_client_reset() => {
                                        tracing::debug!("Connection from {} reset by client", peer);
                                    }
                                    Err(e) => {
                                        let _ = error_tx.send(e);
                                    }
                                }
                            }
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    session: &dyn SshSession,
    target: &ForwardTarget,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), TunnelError> {
    let forwarded = session
        .forward(LOCAL_PG_HOSTNAME, DEFAULT_PG_PORT, &target.host, target.port)
        .await?;

    let stats = pump(stream, forwarded, peer).await?;
    tracing::debug!(
        "Connection from {} closed ({} bytes out, {} bytes in)",
        peer,
        stats.to_forwarded,
        stats.to_socket
    );
    Ok(())
}
