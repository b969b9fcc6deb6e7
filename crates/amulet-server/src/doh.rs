//! DNS over HTTPS (RFC 8484) server.
//!
//! Two routes on the configured path (default `/dns-query`):
//!
//! - `GET` with a `dns` query parameter holding the base64url-encoded
//!   (unpadded) DNS message;
//! - `POST` with a raw `application/dns-message` body.
//!
//! Either feeds the same [`QueryHandler`] as the UDP ingress and answers
//! with `application/dns-message`. Malformed input is a 400; axum answers
//! unmatched methods with 405. TLS terminates here via rustls with h2 and
//! http/1.1 ALPN.

use crate::handler::{QueryContext, QueryHandler};
use crate::{Protocol, Result, ServerError};
use amulet_proto::{Message, MAX_DOH_MESSAGE_SIZE};
use axum::body::Body;
use axum::extract::{Extension, Query, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use data_encoding::BASE64URL_NOPAD;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use hyper_util::service::TowerToHyperService;
use rustls::pki_types::CertificateDer;
use serde::Deserialize;
use socket2::{Domain, Socket, Type};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace};

/// MIME type for DNS messages per RFC 8484.
const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// How long in-flight requests get to finish after shutdown.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// ALPN protocol identifiers.
const ALPN_H2: &[u8] = b"h2";
const ALPN_HTTP11: &[u8] = b"http/1.1";

/// DNS over HTTPS server.
pub struct DohServer {
    listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    router: Router,
    local_addr: SocketAddr,
}

/// Query parameters for GET requests.
#[derive(Debug, Deserialize)]
struct DnsQueryParams {
    /// Base64url-encoded DNS query, without padding.
    dns: String,
}

#[derive(Clone)]
struct AppState {
    handler: Arc<dyn QueryHandler>,
}

/// Peer address of the underlying TLS connection, injected per connection.
#[derive(Debug, Clone, Copy)]
struct ClientAddr(SocketAddr);

impl DohServer {
    /// Loads TLS configuration from PEM certificate and key files, with
    /// HTTP/2 ALPN as RFC 8484 expects and an HTTP/1.1 fallback.
    pub fn load_tls_config<P: AsRef<Path>>(
        cert_path: P,
        key_path: P,
    ) -> Result<Arc<rustls::ServerConfig>> {
        let cert_file = File::open(cert_path.as_ref())
            .map_err(|e| ServerError::Tls(format!("failed to open certificate file: {e}")))?;
        let mut cert_reader = BufReader::new(cert_file);
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ServerError::Tls(format!("failed to parse certificates: {e}")))?;

        if certs.is_empty() {
            return Err(ServerError::Tls("no certificates found in file".into()));
        }

        let key_file = File::open(key_path.as_ref())
            .map_err(|e| ServerError::Tls(format!("failed to open key file: {e}")))?;
        let mut key_reader = BufReader::new(key_file);
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| ServerError::Tls(format!("failed to parse private key: {e}")))?
            .ok_or_else(|| ServerError::Tls("no private key found in file".into()))?;

        let mut config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(format!("failed to build TLS config: {e}")))?;

        config.alpn_protocols = vec![ALPN_H2.to_vec(), ALPN_HTTP11.to_vec()];

        Ok(Arc::new(config))
    }

    /// Binds a new DoH server serving DNS on `path`.
    pub async fn bind(
        addr: SocketAddr,
        tls_config: Arc<rustls::ServerConfig>,
        handler: Arc<dyn QueryHandler>,
        path: &str,
    ) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        let state = AppState { handler };
        let router = Router::new()
            .route(path, get(handle_get_query).post(handle_post_query))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        info!(addr = %local_addr, path, "DoH server listening");

        Ok(Self {
            listener,
            tls_acceptor: TlsAcceptor::from(tls_config),
            router,
            local_addr,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until `shutdown` fires, then drains in-flight
    /// requests for [`DRAIN_TIMEOUT`].
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let tls_acceptor = self.tls_acceptor.clone();
                        let router = self.router.clone().layer(Extension(ClientAddr(peer)));

                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, tls_acceptor, router).await {
                                debug!(error = %e, client = %peer, "DoH connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting DoH connection");
                    }
                },
            }
        }

        info!("DoH server draining");
        drop(self.listener);
        tokio::time::sleep(DRAIN_TIMEOUT).await;

        Ok(())
    }
}

/// Terminates TLS and serves HTTP on one connection.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    tls_acceptor: TlsAcceptor,
    router: Router,
) -> Result<()> {
    trace!(client = %peer, "New DoH connection");

    let tls_stream = tls_acceptor
        .accept(stream)
        .await
        .map_err(|e| ServerError::Tls(format!("TLS handshake failed: {e}")))?;

    let io = TokioIo::new(tls_stream);
    let builder = ConnectionBuilder::new(TokioExecutor::new());
    let service = TowerToHyperService::new(router);

    if let Err(e) = builder.serve_connection_with_upgrades(io, service).await {
        // Usually just the client going away
        debug!(error = %e, client = %peer, "HTTP connection ended");
    }

    Ok(())
}

/// GET: the DNS message rides in the `dns` query parameter, base64url
/// without padding.
async fn handle_get_query(
    State(state): State<AppState>,
    Extension(ClientAddr(peer)): Extension<ClientAddr>,
    Query(params): Query<DnsQueryParams>,
) -> Response {
    let query_bytes = match BASE64URL_NOPAD.decode(params.dns.as_bytes()) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            debug!(error = %e, "Invalid base64url in dns parameter");
            return (
                StatusCode::BAD_REQUEST,
                "invalid base64url encoding in dns parameter",
            )
                .into_response();
        }
    };

    answer(state.handler, query_bytes, peer).await
}

/// POST: the body is the raw DNS message.
async fn handle_post_query(
    State(state): State<AppState>,
    Extension(ClientAddr(peer)): Extension<ClientAddr>,
    headers: HeaderMap,
    request: Request<Body>,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !content_type.starts_with(DNS_MESSAGE_CONTENT_TYPE) {
        return (
            StatusCode::BAD_REQUEST,
            format!("Content-Type must be {DNS_MESSAGE_CONTENT_TYPE}"),
        )
            .into_response();
    }

    let body_bytes = match axum::body::to_bytes(request.into_body(), MAX_DOH_MESSAGE_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Failed to read request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body").into_response();
        }
    };

    answer(state.handler, body_bytes, peer).await
}

/// Decodes the query, drives the handler, and frames the reply.
async fn answer(handler: Arc<dyn QueryHandler>, data: Bytes, peer: SocketAddr) -> Response {
    let query = match Message::parse(&data) {
        Ok(query) => query,
        Err(e) => {
            debug!(error = %e, client = %peer, "Failed to parse DoH query");
            return (StatusCode::BAD_REQUEST, "invalid DNS message").into_response();
        }
    };

    let ctx = QueryContext::new(peer, Protocol::Doh);
    let Some(wire) = handler.handle(query, ctx).await else {
        return (StatusCode::BAD_REQUEST, "unresolvable DNS message").into_response();
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, wire.len())
        .body(Body::from(wire))
        .unwrap_or_else(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to build response").into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DropHandler;
    use amulet_proto::Question;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    fn generate_test_cert() -> (NamedTempFile, NamedTempFile) {
        use rcgen::{generate_simple_self_signed, CertifiedKey};

        let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(subject_alt_names).unwrap();

        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(cert.pem().as_bytes()).unwrap();

        let mut key_file = NamedTempFile::new().unwrap();
        key_file
            .write_all(key_pair.serialize_pem().as_bytes())
            .unwrap();

        (cert_file, key_file)
    }

    #[tokio::test]
    async fn test_doh_server_bind() {
        install_crypto_provider();
        let (cert_file, key_file) = generate_test_cert();
        let tls_config = DohServer::load_tls_config(cert_file.path(), key_file.path()).unwrap();
        let handler = Arc::new(DropHandler);

        let server = DohServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            tls_config,
            handler,
            "/dns-query",
        )
        .await
        .unwrap();

        assert!(server.local_addr().port() > 0);
    }

    #[test]
    fn test_tls_config_alpn() {
        install_crypto_provider();
        let (cert_file, key_file) = generate_test_cert();
        let tls_config = DohServer::load_tls_config(cert_file.path(), key_file.path()).unwrap();

        assert!(tls_config.alpn_protocols.contains(&ALPN_H2.to_vec()));
        assert!(tls_config.alpn_protocols.contains(&ALPN_HTTP11.to_vec()));
    }

    #[test]
    fn test_tls_config_missing_files() {
        install_crypto_provider();
        let result = DohServer::load_tls_config("/nonexistent.crt", "/nonexistent.key");
        assert!(matches!(result, Err(ServerError::Tls(_))));
    }

    #[test]
    fn test_base64url_roundtrip() {
        let query = Message::query(0x0001, 0x0100, Question::new("example.com", 1, 1));
        let wire = query.to_wire().unwrap();

        let encoded = BASE64URL_NOPAD.encode(&wire);
        assert!(!encoded.contains('='));

        let decoded = BASE64URL_NOPAD.decode(encoded.as_bytes()).unwrap();
        assert_eq!(&wire[..], &decoded[..]);
    }
}
