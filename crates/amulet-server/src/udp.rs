//! UDP server: listener plus bounded worker pool.
//!
//! The listener copies each datagram into a job on a bounded queue; a fixed
//! pool of workers drains the queue, each one decoding, resolving, and
//! writing the response. When the queue is full the listener blocks on
//! enqueue, back-pressuring the socket instead of dropping inside the pool.

use crate::handler::{QueryContext, QueryHandler};
use crate::{Protocol, Result, UdpConfig};
use amulet_proto::{Message, MAX_UDP_MESSAGE_SIZE};
use bytes::Bytes;
use futures::FutureExt;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Listener receive deadline; only exists so the shutdown signal is polled
/// between reads.
const RECV_DEADLINE: Duration = Duration::from_secs(1);

enum Job {
    Query { data: Bytes, client: SocketAddr },
    Shutdown,
}

/// UDP DNS server.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    workers: usize,
    queue_capacity: usize,
}

impl UdpServer {
    /// Binds a new UDP server on `config.listen`.
    pub async fn bind(config: &UdpConfig, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let addr = config.listen;
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!(addr = %local_addr, workers = config.workers, "UDP server listening");

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            local_addr,
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the listener and worker pool until `shutdown` fires, then
    /// poisons the queue and waits up to `drain` for workers to finish.
    pub async fn run(
        &self,
        mut shutdown: broadcast::Receiver<()>,
        drain: Duration,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel::<Job>(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let workers: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&rx),
                    Arc::clone(&self.socket),
                    Arc::clone(&self.handler),
                ))
            })
            .collect();

        let mut buf = [0u8; MAX_UDP_MESSAGE_SIZE];
        loop {
            match shutdown.try_recv() {
                Err(broadcast::error::TryRecvError::Empty) => {}
                _ => break,
            }

            match timeout(RECV_DEADLINE, self.socket.recv_from(&mut buf)).await {
                // Deadline: loop around and re-check the shutdown signal
                Err(_) => continue,
                Ok(Ok((len, client))) => {
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    if tx.send(Job::Query { data, client }).await.is_err() {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Error receiving UDP packet");
                }
            }
        }

        info!("UDP listener stopping");

        // One poison value per worker; the queue drains in front of them.
        for _ in 0..self.workers {
            let _ = tx.send(Job::Shutdown).await;
        }
        drop(tx);

        if timeout(drain, async {
            for worker in workers {
                let _ = worker.await;
            }
        })
        .await
        .is_err()
        {
            warn!("UDP workers did not drain within the shutdown budget");
        }

        Ok(())
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
) {
    loop {
        let job = rx.lock().await.recv().await;
        match job {
            None | Some(Job::Shutdown) => break,
            Some(Job::Query { data, client }) => {
                let work = process_query(&socket, &handler, data, client);
                if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
                    error!(
                        worker = id,
                        panic = panic_message(panic.as_ref()),
                        "Worker caught panic, continuing"
                    );
                }
            }
        }
    }
    trace!(worker = id, "UDP worker exiting");
}

async fn process_query(
    socket: &UdpSocket,
    handler: &Arc<dyn QueryHandler>,
    data: Bytes,
    client: SocketAddr,
) {
    let query = match Message::parse(&data) {
        Ok(query) => query,
        Err(e) => {
            // No error response for garbage
            trace!(client = %client, error = %e, "Dropping malformed datagram");
            return;
        }
    };

    let ctx = QueryContext::new(client, Protocol::Udp);
    let Some(response) = handler.handle(query, ctx).await else {
        return;
    };

    if let Err(e) = socket.send_to(&response, client).await {
        debug!(client = %client, error = %e, "Failed to write response");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DropHandler;
    use amulet_proto::Question;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_udp_server_bind() {
        let handler = Arc::new(DropHandler);
        let config = UdpConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            workers: 2,
            queue_capacity: 8,
        };

        let server = UdpServer::bind(&config, handler).await.unwrap();
        assert!(server.local_addr().port() > 0);
    }

    /// Panics on its first query, echoes the query id afterwards.
    struct FlakyHandler {
        calls: AtomicU64,
    }

    #[async_trait]
    impl QueryHandler for FlakyHandler {
        async fn handle(&self, query: Message, _context: QueryContext) -> Option<Bytes> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("synthetic handler failure");
            }
            Some(Bytes::copy_from_slice(&query.header.id.to_be_bytes()))
        }
    }

    #[tokio::test]
    async fn test_worker_survives_handler_panic() {
        let handler = Arc::new(FlakyHandler {
            calls: AtomicU64::new(0),
        });
        let config = UdpConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            workers: 1,
            queue_capacity: 4,
        };
        let server = UdpServer::bind(&config, handler).await.unwrap();
        let addr = server.local_addr();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(async move {
            server.run(shutdown_rx, Duration::from_secs(5)).await.unwrap();
        });

        let query = Message::query(7, 0x0100, Question::new("example.com", 1, 1))
            .to_wire()
            .unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 512];

        // First query blows up inside the single worker: no response
        client.send_to(&query, addr).await.unwrap();
        assert!(
            timeout(Duration::from_millis(300), client.recv_from(&mut buf))
                .await
                .is_err()
        );

        // The same worker must still be alive to answer the second one
        client.send_to(&query, addr).await.unwrap();
        let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("worker did not survive the panic")
            .unwrap();
        assert_eq!(&buf[..len], &7u16.to_be_bytes());

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(boxed.as_ref()), "kaboom");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
