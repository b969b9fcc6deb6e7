//! Cache key.

use std::fmt;

/// Cache key: `(record type, lowercased domain)`.
///
/// Both ingress paths normalize through this constructor, so a name cached
/// via UDP is a hit for the same name over DoH regardless of case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    domain: String,
    rtype: u16,
}

impl CacheKey {
    /// Creates a key, lowercasing the domain.
    pub fn new(domain: &str, rtype: u16) -> Self {
        Self {
            domain: domain.to_ascii_lowercase(),
            rtype,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rtype, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_normalizes_case() {
        assert_eq!(CacheKey::new("EXAMPLE.com", 1), CacheKey::new("example.COM", 1));
    }

    #[test]
    fn test_key_separates_types() {
        assert_ne!(CacheKey::new("example.com", 1), CacheKey::new("example.com", 28));
    }

    #[test]
    fn test_display_form() {
        assert_eq!(CacheKey::new("Example.com", 1).to_string(), "1:example.com");
    }
}
