//! # Amulet DNS Filtering
//!
//! Blocklist and override store for the Amulet resolver.
//!
//! Domains from a hosts-style map file are stored in a radix tree keyed by
//! their reverse-labeled form, so the hierarchical suffix test ("is this
//! name under a blocked domain?") becomes a prefix walk. Entries mapping to
//! an unspecified address (0.0.0.0 or ::) block; any other address is a
//! custom override.
//!
//! Lookups are lock-free against an atomically published tree; a single
//! writer rebuilds or clones the tree and swaps it in.

#![warn(clippy::all)]

use thiserror::Error;

pub mod hosts;
pub mod radix;
pub mod store;

pub use hosts::HostEntry;
pub use radix::RadixTree;
pub use store::{reverse_domain, FilterEntry, FilterStore};

/// Errors raised while loading filter data.
#[derive(Error, Debug)]
pub enum FilterError {
    /// IO error while reading a map file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
