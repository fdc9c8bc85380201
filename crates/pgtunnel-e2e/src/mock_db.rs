//! Mock database service for E2E tests
//!
//! Stands in for the Postgres endpoint behind the bastion host. Mock SSH
//! channels are plain TCP connections to this service.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Behavior mode for the mock database
#[derive(Clone, Debug)]
pub enum DbServiceMode {
    /// Echo back all received data
    Echo,
    /// Read one chunk, send a fixed response, then close
    FixedResponse(Vec<u8>),
    /// Read until EOF without ever answering
    Silent,
}

/// A finished connection as seen by the database
#[derive(Clone, Debug)]
pub struct RecordedDbConnection {
    pub received_data: Vec<u8>,
    pub peer_addr: SocketAddr,
}

/// A mock database service
pub struct MockDbService {
    addr: SocketAddr,
    connections: Arc<RwLock<Vec<RecordedDbConnection>>>,
    mode: Arc<RwLock<DbServiceMode>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl MockDbService {
    /// Start an echoing mock database on an ephemeral port
    pub async fn start() -> Self {
        Self::start_with_mode(DbServiceMode::Echo).await
    }

    pub async fn start_with_mode(mode: DbServiceMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock database");
        let addr = listener.local_addr().unwrap();

        let connections: Arc<RwLock<Vec<RecordedDbConnection>>> = Arc::new(RwLock::new(Vec::new()));
        let mode = Arc::new(RwLock::new(mode));

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let connections_clone = connections.clone();
        let mode_clone = mode.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Mock database shutting down");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                let connections = connections_clone.clone();
                                let mode = mode_clone.read().clone();

                                tokio::spawn(async move {
                                    handle_connection(stream, peer_addr, connections, mode).await;
                                });
                            }
                            Err(e) => {
                                tracing::error!("Mock database accept error: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        });

        Self {
            addr,
            connections,
            mode,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections that have finished
    pub fn get_connections(&self) -> Vec<RecordedDbConnection> {
        self.connections.read().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn set_mode(&self, mode: DbServiceMode) {
        *self.mode.write() = mode;
    }
}

impl Drop for MockDbService {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    connections: Arc<RwLock<Vec<RecordedDbConnection>>>,
    mode: DbServiceMode,
) {
    let mut received_data = Vec::new();
    let mut buf = [0u8; 4096];

    match mode {
        DbServiceMode::Echo => loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    received_data.extend_from_slice(&buf[..n]);
                    if let Err(e) = stream.write_all(&buf[..n]).await {
                        tracing::debug!("Echo write error: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("Echo read error: {}", e);
                    break;
                }
            }
        },
        DbServiceMode::FixedResponse(response) => {
            if let Ok(n) = stream.read(&mut buf).await {
                received_data.extend_from_slice(&buf[..n]);
            }
            if let Err(e) = stream.write_all(&response).await {
                tracing::debug!("Fixed response write error: {}", e);
            }
        }
        DbServiceMode::Silent => loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received_data.extend_from_slice(&buf[..n]),
            }
        },
    }

    connections.write().push(RecordedDbConnection {
        received_data,
        peer_addr,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let service = MockDbService::start().await;

        let mut stream = TcpStream::connect(service.addr()).await.unwrap();
        stream.write_all(b"SELECT 1;").await.unwrap();

        let mut buf = [0u8; 32];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"SELECT 1;");

        drop(stream);
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(service.connection_count(), 1);
        assert_eq!(service.get_connections()[0].received_data, b"SELECT 1;");
    }

    #[tokio::test]
    async fn test_fixed_response() {
        let service =
            MockDbService::start_with_mode(DbServiceMode::FixedResponse(b"READY".to_vec())).await;

        let mut stream = TcpStream::connect(service.addr()).await.unwrap();
        stream.write_all(b"STARTUP").await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"READY");
    }
}
