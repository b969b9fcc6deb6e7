//! # Amulet DNS Server
//!
//! Ingress infrastructure for the Amulet resolver: a UDP listener backed by
//! a bounded worker pool, and a DoH (RFC 8484) HTTPS listener. Both decode
//! requests and drive the same [`QueryHandler`].
//!
//! Shutdown is cooperative: a broadcast signal stops the listeners, UDP
//! workers drain the job queue behind poison values, and the DoH server
//! drains in-flight requests for a bounded period.

#![warn(clippy::all)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod doh;
pub mod handler;
pub mod udp;

pub use doh::DohServer;
pub use handler::{QueryContext, QueryHandler};
pub use udp::UdpServer;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake error.
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// DNS transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain UDP.
    Udp,
    /// DNS over HTTPS.
    Doh,
}

impl Protocol {
    /// Returns the protocol name.
    pub const fn name(&self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Doh => "DoH",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// UDP listener configuration.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Listen address.
    pub listen: SocketAddr,

    /// Worker pool size.
    pub workers: usize,

    /// Bounded job queue capacity; a full queue back-pressures the
    /// listener.
    pub queue_capacity: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], amulet_proto::DNS_PORT)),
            workers: 500,
            queue_capacity: 500,
        }
    }
}

/// DoH listener configuration.
#[derive(Debug, Clone)]
pub struct DohConfig {
    /// Listen address.
    pub listen: SocketAddr,

    /// PEM certificate chain path.
    pub cert_path: PathBuf,

    /// PEM private key path.
    pub key_path: PathBuf,

    /// HTTP path serving DNS queries.
    pub path: String,
}

impl DohConfig {
    /// Creates a DoH configuration with the standard RFC 8484 path.
    pub fn new(listen: SocketAddr, cert_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            listen,
            cert_path,
            key_path,
            path: "/dns-query".to_string(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP listener.
    pub udp: UdpConfig,

    /// Optional DoH listener.
    pub doh: Option<DohConfig>,

    /// Budget for draining workers on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            udp: UdpConfig::default(),
            doh: None,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// The composed DNS server: all configured listeners over one handler.
pub struct DnsServer {
    config: ServerConfig,
    handler: Arc<dyn QueryHandler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DnsServer {
    /// Creates a new server.
    pub fn new(config: ServerConfig, handler: Arc<dyn QueryHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            shutdown_tx,
        }
    }

    /// Binds and runs every configured listener until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();

        let udp = UdpServer::bind(&self.config.udp, self.handler.clone()).await?;
        let shutdown_rx = self.shutdown_tx.subscribe();
        let drain = self.config.shutdown_timeout;
        handles.push(tokio::spawn(
            async move { udp.run(shutdown_rx, drain).await },
        ));

        if let Some(doh_config) = &self.config.doh {
            let tls_config =
                DohServer::load_tls_config(&doh_config.cert_path, &doh_config.key_path)?;
            let doh = DohServer::bind(
                doh_config.listen,
                tls_config,
                self.handler.clone(),
                &doh_config.path,
            )
            .await?;
            let shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move { doh.run(shutdown_rx).await }));
        }

        for handle in handles {
            handle
                .await
                .map_err(|e| ServerError::Io(std::io::Error::other(e)))??;
        }

        Ok(())
    }

    /// Initiates graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
