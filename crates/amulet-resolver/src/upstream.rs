//! Upstream exchange over plain UDP.

use crate::{ResolverError, Result};
use amulet_proto::MAX_UDP_MESSAGE_SIZE;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// One upstream resolver address.
///
/// Sockets are per-attempt: each exchange binds an ephemeral socket,
/// connects, and drops it on return. No pooling, no TCP fallback.
#[derive(Debug, Clone, Copy)]
pub struct Upstream {
    addr: SocketAddr,
}

impl Upstream {
    /// Creates an upstream for the given address.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Sends `query` and waits up to `deadline` for a single datagram
    /// reply of at most 512 bytes.
    pub async fn exchange(&self, query: &[u8], deadline: Duration) -> Result<Bytes> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.addr).await?;
        socket.send(query).await?;

        let mut buf = [0u8; MAX_UDP_MESSAGE_SIZE];
        let len = timeout(deadline, socket.recv(&mut buf))
            .await
            .map_err(|_| ResolverError::Timeout)??;

        Ok(Bytes::copy_from_slice(&buf[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exchange_roundtrip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..len], peer).await.unwrap();
        });

        let reply = Upstream::new(addr)
            .exchange(b"ping", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&reply[..], b"ping");
    }

    #[tokio::test]
    async fn test_exchange_timeout() {
        // Bound but never answered
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let result = Upstream::new(addr)
            .exchange(b"ping", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(ResolverError::Timeout)));
    }
}
