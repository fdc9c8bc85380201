//! Bidirectional copy between a local socket and a forwarded SSH stream

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use pgtunnel_common::TunnelError;

const BUFFER_SIZE: usize = 8192;

/// Which end of a forwarded connection an I/O error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Socket,
    Forwarded,
}

impl Side {
    fn name(self) -> &'static str {
        match self {
            Self::Socket => "local socket",
            Self::Forwarded => "forwarded stream",
        }
    }

    fn error(self, peer: SocketAddr, source: io::Error) -> TunnelError {
        match self {
            Self::Socket => TunnelError::Socket { peer, source },
            Self::Forwarded => TunnelError::ForwardedStream { peer, source },
        }
    }
}

/// Bytes copied in each direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub to_forwarded: u64,
    pub to_socket: u64,
}

/// Copy bytes both ways until both directions reach EOF.
///
/// EOF on one side half-closes the other side's write half and leaves the
/// opposite direction running. The first I/O error ends both directions and is
/// returned tagged with the side it came from.
pub async fn pump<S, R>(socket: S, forwarded: R, peer: SocketAddr) -> Result<PumpStats, TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (socket_read, socket_write) = tokio::io::split(socket);
    let (forwarded_read, forwarded_write) = tokio::io::split(forwarded);

    let (to_forwarded, to_socket) = tokio::try_join!(
        copy_half(socket_read, forwarded_write, Side::Socket, Side::Forwarded, peer),
        copy_half(forwarded_read, socket_write, Side::Forwarded, Side::Socket, peer),
    )?;

    Ok(PumpStats {
        to_forwarded,
        to_socket,
    })
}

async fn copy_half<Rd, Wr>(
    mut reader: Rd,
    mut writer: Wr,
    from: Side,
    to: Side,
    peer: SocketAddr,
) -> Result<u64, TunnelError>
where
    Rd: AsyncRead + Unpin,
    Wr: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return Err(from.error(peer, e)),
        };

        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| to.error(peer, e))?;
        total += n as u64;
    }

    tracing::debug!("{} for {} ended after {} bytes", from.name(), peer, total);

    // Half-close; the peer may already be gone
    if let Err(e) = writer.shutdown().await {
        tracing::debug!("Failed to half-close {} for {}: {}", to.name(), peer, e);
    }

    Ok(total)
}
