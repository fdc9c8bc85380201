use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Resolves when the operator asks the tunnel to stop
#[async_trait]
pub trait ShutdownSignal: Send + Sync {
    async fn recv(&self);
}

/// Ctrl+C, plus SIGTERM on unix
#[derive(Debug, Default, Clone)]
pub struct OsSignals;

#[async_trait]
impl ShutdownSignal for OsSignals {
    async fn recv(&self) {
        use tokio::signal;

        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }
    }
}

#[async_trait]
impl ShutdownSignal for CancellationToken {
    async fn recv(&self) {
        self.cancelled().await;
    }
}
