//! Hosts-file parsing.
//!
//! The override map uses hosts syntax: `<ip> <domain>` per line, `#`
//! comments, blank lines ignored. The domain ends at the next whitespace,
//! so trailing comments or extra hostnames on a line are dropped.

use crate::FilterError;
use std::net::IpAddr;
use std::path::Path;

/// One accepted line of a hosts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    /// Address the domain maps to. Unspecified (0.0.0.0 / ::) means block.
    pub addr: IpAddr,

    /// The mapped domain, as written.
    pub domain: String,
}

/// Parses hosts-file content, skipping comments, blank lines, and lines
/// that do not parse as `<ip> <domain>`.
pub fn parse(content: &str) -> Vec<HostEntry> {
    content.lines().filter_map(parse_line).collect()
}

/// Reads and parses a hosts file.
pub fn load(path: &Path) -> Result<Vec<HostEntry>, FilterError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse(&content))
}

fn parse_line(line: &str) -> Option<HostEntry> {
    let entry = line.trim();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }

    let mut fields = entry.split_whitespace();
    let addr: IpAddr = fields.next()?.parse().ok()?;
    let domain = fields.next()?;
    if domain.is_empty() {
        return None;
    }

    Some(HostEntry {
        addr,
        domain: domain.to_string(),
    })
}
