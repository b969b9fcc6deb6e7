//! The published filter store.
//!
//! Readers (resolver workers) traverse the current tree lock-free; writers
//! build a fresh tree (full reload) or clone-and-mutate (single-entry
//! updates) and publish it with an atomic pointer swap. A single writer,
//! the control event loop, serializes mutations.

use crate::hosts;
use crate::radix::RadixTree;
use crate::FilterError;
use arc_swap::ArcSwap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A filter verdict for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterEntry {
    /// The mapped address.
    pub addr: IpAddr,
}

impl FilterEntry {
    /// True for block entries (0.0.0.0 or ::), false for custom overrides.
    pub fn is_block(&self) -> bool {
        self.addr.is_unspecified()
    }

    /// The four rdata bytes for a synthesized A answer.
    ///
    /// IPv6 entries are either the `::` block sentinel or a v4-mapped
    /// address; anything else degrades to 0.0.0.0, which blocks.
    pub fn ipv4_octets(&self) -> [u8; 4] {
        match self.addr {
            IpAddr::V4(v4) => v4.octets(),
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(|v4| v4.octets())
                .unwrap_or([0, 0, 0, 0]),
        }
    }
}

/// Blocklist/override store keyed by reverse-labeled lowercased domains.
pub struct FilterStore {
    tree: ArcSwap<RadixTree<FilterEntry>>,
}

impl Default for FilterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tree: ArcSwap::from_pointee(RadixTree::new()),
        }
    }

    /// Looks up a domain; suffix containment is handled by the reversed
    /// radix keys, so `a.ads.example.com` matches an `ads.example.com`
    /// entry.
    pub fn lookup(&self, domain: &str) -> Option<FilterEntry> {
        let key = store_key(domain);
        self.tree.load().get(&key).copied()
    }

    /// Number of entries in the current tree.
    pub fn len(&self) -> usize {
        self.tree.load().len()
    }

    /// Returns true if no entries are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuilds the store from a hosts file and publishes the new tree.
    ///
    /// Returns the number of entries loaded.
    pub fn load_file(&self, path: &Path) -> Result<usize, FilterError> {
        let entries = hosts::load(path)?;

        let mut tree = RadixTree::new();
        for entry in &entries {
            tree.insert(
                &store_key(&entry.domain),
                FilterEntry { addr: entry.addr },
            );
        }

        let count = tree.len();
        self.tree.store(Arc::new(tree));

        info!(path = %path.display(), entries = count, "Loaded site map");
        Ok(count)
    }

    /// Adds or replaces a single entry.
    pub fn insert(&self, domain: &str, addr: IpAddr) {
        let mut tree = (*self.tree.load_full()).clone();
        tree.insert(&store_key(domain), FilterEntry { addr });
        self.tree.store(Arc::new(tree));
        debug!(domain, %addr, "Added site entry");
    }

    /// Removes an entry; returns true if it was present.
    pub fn remove(&self, domain: &str) -> bool {
        let mut tree = (*self.tree.load_full()).clone();
        let removed = tree.remove(&store_key(domain)).is_some();
        if removed {
            self.tree.store(Arc::new(tree));
            debug!(domain, "Removed site entry");
        }
        removed
    }

    /// Lists all entries as `(domain, entry)` pairs, domains restored to
    /// their forward label order.
    pub fn entries(&self) -> Vec<(String, FilterEntry)> {
        self.tree
            .load()
            .entries()
            .into_iter()
            .map(|(key, entry)| (reverse_domain(&key), entry))
            .collect()
    }
}

/// Label-wise reversal: `a.b.c` → `c.b.a`.
pub fn reverse_domain(domain: &str) -> String {
    let mut parts: Vec<&str> = domain.split('.').collect();
    parts.reverse();
    parts.join(".")
}

fn store_key(domain: &str) -> String {
    reverse_domain(&domain.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reverse_domain() {
        assert_eq!(reverse_domain("a.b.c"), "c.b.a");
        assert_eq!(reverse_domain("example.com"), "com.example");
        assert_eq!(reverse_domain("single"), "single");
        assert_eq!(reverse_domain(""), "");
    }

    #[test]
    fn test_lookup_block_and_override() {
        let store = FilterStore::new();
        store.insert("doubleclick.net", "0.0.0.0".parse().unwrap());
        store.insert("myhost.local", "192.168.1.10".parse().unwrap());

        let blocked = store.lookup("doubleclick.net").unwrap();
        assert!(blocked.is_block());
        assert_eq!(blocked.ipv4_octets(), [0, 0, 0, 0]);

        let overridden = store.lookup("myhost.local").unwrap();
        assert!(!overridden.is_block());
        assert_eq!(overridden.ipv4_octets(), [192, 168, 1, 10]);

        assert_eq!(store.lookup("example.com"), None);
    }

    #[test]
    fn test_lookup_covers_subdomains() {
        let store = FilterStore::new();
        store.insert("ads.example.com", "0.0.0.0".parse().unwrap());

        assert!(store.lookup("ads.example.com").is_some());
        assert!(store.lookup("static.ads.example.com").is_some());
        assert!(store.lookup("a.b.ads.example.com").is_some());
        assert!(store.lookup("example.com").is_none());
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let store = FilterStore::new();
        store.insert("Tracker.Example.COM", "0.0.0.0".parse().unwrap());

        assert!(store.lookup("tracker.example.com").is_some());
        assert!(store.lookup("TRACKER.EXAMPLE.COM").is_some());
    }

    #[test]
    fn test_v6_block_sentinel() {
        let store = FilterStore::new();
        store.insert("ads.example", "::".parse().unwrap());

        let entry = store.lookup("ads.example").unwrap();
        assert!(entry.is_block());
        assert_eq!(entry.ipv4_octets(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_remove() {
        let store = FilterStore::new();
        store.insert("a.example", "0.0.0.0".parse().unwrap());

        assert!(store.remove("a.example"));
        assert!(!store.remove("a.example"));
        assert!(store.lookup("a.example").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# map").unwrap();
        writeln!(file, "0.0.0.0 doubleclick.net").unwrap();
        writeln!(file, "192.168.1.10 myhost.local").unwrap();
        file.flush().unwrap();

        let store = FilterStore::new();
        let count = store.load_file(file.path()).unwrap();
        assert_eq!(count, 2);
        assert!(store.lookup("doubleclick.net").unwrap().is_block());

        // Reload replaces the published tree wholesale
        let mut file2 = tempfile::NamedTempFile::new().unwrap();
        writeln!(file2, "0.0.0.0 other.net").unwrap();
        file2.flush().unwrap();

        store.load_file(file2.path()).unwrap();
        assert!(store.lookup("doubleclick.net").is_none());
        assert!(store.lookup("other.net").is_some());
    }

    #[test]
    fn test_entries_restore_forward_order() {
        let store = FilterStore::new();
        store.insert("ads.example.com", "0.0.0.0".parse().unwrap());

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "ads.example.com");
    }
}
