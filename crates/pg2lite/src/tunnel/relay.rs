//! Local port forwarding: accept loop and bidirectional byte relay.

use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Byte stream to the forwarding target.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> AsyncStream for T {}

/// Boxed outbound stream returned by a [`ChannelOpener`].
pub type TunnelStream = Pin<Box<dyn AsyncStream>>;

/// Opens one outbound stream per accepted local connection.
#[async_trait]
pub trait ChannelOpener: Send + Sync + 'static {
    /// Open a stream to the target on behalf of the local peer.
    async fn open(&self, peer: SocketAddr) -> Result<TunnelStream>;
}

/// A local listener relaying every connection through a [`ChannelOpener`].
pub struct Forwarder {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_loop: JoinHandle<()>,
}

impl Forwarder {
    /// Bind an ephemeral port on the loopback interface and start accepting.
    pub async fn bind<O: ChannelOpener>(opener: Arc<O>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| MigrateError::tunnel(e, "binding local tunnel listener"))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| MigrateError::tunnel(e, "reading local tunnel address"))?;

        let cancel = CancellationToken::new();
        let accept_loop = tokio::spawn(accept_loop(listener, opener, cancel.clone()));

        debug!("Tunnel listening on {}", local_addr);
        Ok(Self {
            local_addr,
            cancel,
            accept_loop,
        })
    }

    /// Address local clients connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and release the listener.
    ///
    /// Relays already in flight are not interrupted.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.accept_loop.await {
            warn!("Tunnel accept loop failed: {}", e);
        }
        debug!("Tunnel listener on {} closed", self.local_addr);
    }
}

async fn accept_loop<O: ChannelOpener>(
    listener: TcpListener,
    opener: Arc<O>,
    cancel: CancellationToken,
) {
    loop {
        let (socket, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("Error accepting tunnel connection: {}", e);
                    return;
                }
            },
        };

        let opener = opener.clone();
        tokio::spawn(async move {
            match opener.open(peer).await {
                Ok(remote) => relay(socket, remote, peer),
                Err(e) => warn!("Error opening tunnel channel for {}: {}", peer, e),
            }
        });
    }
}

/// Relay bytes between a local socket and the remote stream.
///
/// Each direction runs as its own task; when either one finishes or fails,
/// both sockets are closed.
fn relay<L>(local: L, remote: TunnelStream, peer: SocketAddr)
where
    L: AsyncRead + AsyncWrite + Send + 'static,
{
    let (local_read, local_write) = tokio::io::split(local);
    let (remote_read, remote_write) = tokio::io::split(remote);
    let done = CancellationToken::new();

    tokio::spawn(pipe(local_read, remote_write, done.clone(), peer, "local->remote"));
    tokio::spawn(pipe(remote_read, local_write, done, peer, "remote->local"));
}

async fn pipe<R, W>(
    mut reader: R,
    mut writer: W,
    done: CancellationToken,
    peer: SocketAddr,
    direction: &'static str,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::select! {
        copied = tokio::io::copy(&mut reader, &mut writer) => match copied {
            Ok(bytes) => debug!("Tunnel {} {} finished after {} bytes", peer, direction, bytes),
            Err(e) => warn!("Error copying tunnel connection {} {}: {}", peer, direction, e),
        },
        _ = done.cancelled() => {}
    }

    let _ = writer.shutdown().await;
    done.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    /// Opener that dials a plain TCP address, standing in for an SSH channel.
    struct TcpOpener {
        target: SocketAddr,
    }

    #[async_trait]
    impl ChannelOpener for TcpOpener {
        async fn open(&self, _peer: SocketAddr) -> Result<TunnelStream> {
            let stream = TcpStream::connect(self.target)
                .await
                .map_err(|e| MigrateError::tunnel(e, "dialing test target"))?;
            Ok(Box::pin(stream))
        }
    }

    /// Opener whose every dial fails.
    struct FailingOpener;

    #[async_trait]
    impl ChannelOpener for FailingOpener {
        async fn open(&self, _peer: SocketAddr) -> Result<TunnelStream> {
            Err(MigrateError::tunnel("administratively prohibited", "opening channel"))
        }
    }

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let (mut r, mut w) = socket.split();
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
        addr
    }

    async fn round_trip(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(payload).await.unwrap();
        let mut buf = vec![0u8; payload.len()];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_relays_bytes_transparently() {
        let target = echo_server().await;
        let forwarder = Forwarder::bind(Arc::new(TcpOpener { target })).await.unwrap();

        assert!(forwarder.local_addr().ip().is_loopback());
        assert_ne!(forwarder.local_addr().port(), 0);

        let echoed = round_trip(forwarder.local_addr(), b"SELECT 1;").await;
        assert_eq!(echoed, b"SELECT 1;");

        forwarder.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_connections() {
        let target = echo_server().await;
        let forwarder = Forwarder::bind(Arc::new(TcpOpener { target })).await.unwrap();
        let addr = forwarder.local_addr();

        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                tokio::spawn(async move {
                    let payload = vec![i; 4096];
                    assert_eq!(round_trip(addr, &payload).await, payload);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        forwarder.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_channel_is_isolated() {
        let forwarder = Forwarder::bind(Arc::new(FailingOpener)).await.unwrap();
        let addr = forwarder.local_addr();

        // The failed dial closes only this local connection
        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);

        // The listener keeps accepting
        let second = TcpStream::connect(addr).await;
        assert!(second.is_ok());

        forwarder.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let target = echo_server().await;
        let forwarder = Forwarder::bind(Arc::new(TcpOpener { target })).await.unwrap();
        let addr = forwarder.local_addr();

        forwarder.shutdown().await;

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
