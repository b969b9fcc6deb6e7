//! Query handler interface.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Instant;

use super::Protocol;

/// Context for one DNS query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Client address.
    pub client: SocketAddr,

    /// Ingress protocol.
    pub protocol: Protocol,

    /// When the query was received.
    pub received_at: Instant,
}

impl QueryContext {
    /// Creates a new query context.
    pub fn new(client: SocketAddr, protocol: Protocol) -> Self {
        Self {
            client,
            protocol,
            received_at: Instant::now(),
        }
    }

    /// Time since the query was received.
    pub fn elapsed(&self) -> std::time::Duration {
        self.received_at.elapsed()
    }
}

/// Query handler driven by every ingress.
///
/// Returns the encoded response bytes, or `None` when no response should be
/// sent (UDP drops the packet; DoH answers 400).
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Handles a parsed DNS query.
    async fn handle(&self, query: amulet_proto::Message, context: QueryContext) -> Option<Bytes>;
}

/// Handler that drops every query. Useful in tests.
pub struct DropHandler;

#[async_trait]
impl QueryHandler for DropHandler {
    async fn handle(&self, _query: amulet_proto::Message, _context: QueryContext) -> Option<Bytes> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_context() {
        let ctx = QueryContext::new("127.0.0.1:12345".parse().unwrap(), Protocol::Udp);
        assert_eq!(ctx.protocol, Protocol::Udp);
        assert!(ctx.elapsed() < std::time::Duration::from_secs(1));
    }
}
