//! # Amulet DNS Resolver
//!
//! The query pipeline: override/block lookup, answer cache, then upstream
//! fan-out over plain UDP with strict-order failover.
//!
//! A query's header is mutated in place into the response header, and the
//! pipeline returns encoded response bytes; whichever path produced the
//! answer, ingress code just writes the bytes back to the client.

#![warn(clippy::all)]

use amulet_cache::{CachedRecord, DnsCache};
use amulet_config::ConfigHandle;
use amulet_filter::FilterStore;
use amulet_proto::{name, rcode, Answer, Message, HEADER_SIZE};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

pub mod upstream;

pub use upstream::Upstream;

/// TTL for answers synthesized from the filter store, in seconds.
pub const OVERRIDE_TTL: u32 = 600;

/// Per-upstream receive deadline.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_millis(100);

/// Resolver error.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// Upstream did not answer within the deadline.
    #[error("timeout waiting for upstream")]
    Timeout,

    /// Socket-level failure talking to an upstream.
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Wire codec failure.
    #[error(transparent)]
    Proto(#[from] amulet_proto::Error),
}

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;

/// The query-processing pipeline.
///
/// Holds read handles to the shared stores; per-query state lives on the
/// stack of [`Resolver::lookup`]. Safe to share across ingress workers.
pub struct Resolver {
    config: ConfigHandle,
    filter: Arc<FilterStore>,
    cache: Arc<DnsCache>,
    upstreams: Option<Vec<SocketAddr>>,
    stats: ResolverStats,
}

impl Resolver {
    /// Creates a resolver over the shared stores.
    pub fn new(config: ConfigHandle, filter: Arc<FilterStore>, cache: Arc<DnsCache>) -> Self {
        Self {
            config,
            filter,
            cache,
            upstreams: None,
            stats: ResolverStats::default(),
        }
    }

    /// Overrides the upstream addresses derived from configuration.
    /// Tests point this at stub sockets on ephemeral ports.
    pub fn with_upstreams(mut self, upstreams: Vec<SocketAddr>) -> Self {
        self.upstreams = Some(upstreams);
        self
    }

    /// Resolution counters.
    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    fn upstream_addrs(&self) -> Vec<SocketAddr> {
        if let Some(upstreams) = &self.upstreams {
            return upstreams.clone();
        }
        let config = self.config.load();
        vec![
            SocketAddr::from((config.upstream_primary, amulet_proto::DNS_PORT)),
            SocketAddr::from((config.upstream_secondary, amulet_proto::DNS_PORT)),
        ]
    }

    /// Resolves one query to encoded response bytes.
    ///
    /// The pipeline is linear: response header setup, override check,
    /// cache check, then upstreams in configured order. Only the upstream
    /// step loops.
    pub async fn lookup(&self, mut query: Message) -> Result<Bytes> {
        // Kept for the upstream copy; the in-place header becomes the
        // response header below.
        let original_flags = query.header.flags;

        query.header.qdcount = 1;
        query.header.arcount = 0;
        query.header.set_response();
        query.header.set_recursion_available();

        let qname_wire = name::encode(&query.question.name)?;

        if let Some(entry) = self.filter.lookup(&query.question.name) {
            self.stats.record_override();
            debug!(
                domain = %query.question.name,
                addr = %entry.addr,
                blocked = entry.is_block(),
                "Answering from site map"
            );

            let answer = Answer::synthesize(
                qname_wire,
                query.question.qtype,
                query.question.qclass,
                OVERRIDE_TTL,
                Bytes::copy_from_slice(&entry.ipv4_octets()),
            );
            query.answers = vec![answer];
            query.header.ancount = 1;
            return Ok(query.to_wire()?);
        }

        if let Some(record) = self.cache.get(&query.question.name, query.question.qtype) {
            self.stats.record_cache_hit();
            let ttl = record.remaining_ttl(Instant::now()).as_secs() as u32;
            debug!(domain = %query.question.name, ttl, "Answering from cache");

            let answer = Answer::synthesize(
                qname_wire,
                query.question.qtype,
                query.question.qclass,
                ttl,
                record.data,
            );
            query.answers = vec![answer];
            query.header.ancount = 1;
            return Ok(query.to_wire()?);
        }

        let upstream_query =
            Message::query(query.header.id, original_flags, query.question.clone()).to_wire()?;

        for addr in self.upstream_addrs() {
            self.stats.record_upstream_query();

            let reply = match Upstream::new(addr)
                .exchange(&upstream_query, UPSTREAM_TIMEOUT)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    self.stats.record_upstream_failure();
                    debug!(upstream = %addr, error = %e, "Upstream exchange failed");
                    continue;
                }
            };

            if reply.len() < HEADER_SIZE {
                self.stats.record_upstream_failure();
                debug!(upstream = %addr, len = reply.len(), "Runt upstream reply");
                continue;
            }

            // Low nibble of byte 3 is the reply's RCODE; splice it into
            // the response flags.
            let reply_rcode = reply[3] & 0x0F;
            query.header.set_rcode(reply_rcode);

            if rcode::is_retryable(reply_rcode) {
                self.stats.record_upstream_failure();
                debug!(
                    upstream = %addr,
                    rcode = rcode::name(reply_rcode),
                    "Upstream refused, trying next"
                );
                continue;
            }

            if reply_rcode != rcode::NOERROR {
                // Propagated verbatim (NXDOMAIN and friends), no answers
                query.header.ancount = 0;
                query.answers.clear();
                return Ok(query.to_wire()?);
            }

            match Message::decode_answers(&reply) {
                Ok(answers) => {
                    trace!(
                        upstream = %addr,
                        answers = answers.len(),
                        domain = %query.question.name,
                        "Upstream answered"
                    );

                    for answer in &answers {
                        let cache = Arc::clone(&self.cache);
                        let domain = query.question.name.clone();
                        let record = CachedRecord::new(
                            answer.rtype,
                            Duration::from_secs(u64::from(answer.ttl)),
                            answer.rdata.clone(),
                        );
                        tokio::spawn(async move {
                            cache.set(&domain, record);
                        });
                    }

                    query.header.ancount = answers.len() as u16;
                    query.answers = answers;
                    break;
                }
                Err(e) => {
                    self.stats.record_upstream_failure();
                    debug!(upstream = %addr, error = %e, "Undecodable upstream reply");
                    continue;
                }
            }
        }

        // Either an upstream answered above, or this carries ancount=0 and
        // the last spliced RCODE.
        Ok(query.to_wire()?)
    }
}

/// Counters over resolution outcomes.
#[derive(Debug, Default)]
pub struct ResolverStats {
    overrides: AtomicU64,
    cache_hits: AtomicU64,
    upstream_queries: AtomicU64,
    upstream_failures: AtomicU64,
}

impl ResolverStats {
    fn record_override(&self) {
        self.overrides.fetch_add(1, Ordering::Relaxed);
    }

    fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_upstream_query(&self) {
        self.upstream_queries.fetch_add(1, Ordering::Relaxed);
    }

    fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Queries answered from the site map.
    pub fn overrides(&self) -> u64 {
        self.overrides.load(Ordering::Relaxed)
    }

    /// Queries answered from the cache.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Upstream exchange attempts.
    pub fn upstream_queries(&self) -> u64 {
        self.upstream_queries.load(Ordering::Relaxed)
    }

    /// Upstream attempts that failed or were refused.
    pub fn upstream_failures(&self) -> u64 {
        self.upstream_failures.load(Ordering::Relaxed)
    }
}
