//! Control events.
//!
//! External collaborators (a UI, a management socket) drive the running
//! server through a single `mpsc` channel of these events. One event loop
//! owns the receiving side and is the only writer of configuration and
//! filter state, so updates serialize without further locking.

use crate::Config;
use std::net::IpAddr;

/// An operation on the running server's mutable state.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Replace the configuration snapshot. Invalid updates are rejected
    /// and the current snapshot stays in place.
    UpdateConfig(Box<Config>),

    /// Add or replace one site map entry.
    AddSite {
        /// Domain to map.
        domain: String,
        /// Target address; unspecified (0.0.0.0 / ::) blocks.
        addr: IpAddr,
    },

    /// Remove one site map entry.
    RemoveSite {
        /// Domain to unmap.
        domain: String,
    },

    /// Rebuild the filter store from the configured map file.
    ReloadSites,
}
