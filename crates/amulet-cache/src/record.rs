//! Cached record data.

use bytes::Bytes;
use std::time::{Duration, Instant};

/// A cached answer: opaque rdata with an absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord {
    /// Record type of the cached data.
    pub rtype: u16,

    /// Absolute expiry instant (creation + TTL).
    pub expires_at: Instant,

    /// Opaque rdata bytes.
    pub data: Bytes,
}

impl CachedRecord {
    /// Creates a record expiring `ttl` from now.
    pub fn new(rtype: u16, ttl: Duration, data: Bytes) -> Self {
        Self {
            rtype,
            expires_at: Instant::now() + ttl,
            data,
        }
    }

    /// True once `now` reaches the expiry instant. An expired record is
    /// never served.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Seconds left before expiry, saturating at zero.
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}
