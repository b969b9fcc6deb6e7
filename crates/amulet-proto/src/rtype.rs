//! DNS record types.
//!
//! The wire carries record types as bare u16 values; this enum exists for
//! readable logs and cache listings, not for exhaustive RFC coverage.

use std::fmt;

/// Well-known DNS record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum RecordType {
    /// IPv4 host address.
    A,
    /// Authoritative name server.
    NS,
    /// Canonical name.
    CNAME,
    /// Start of authority.
    SOA,
    /// Domain name pointer.
    PTR,
    /// Mail exchange.
    MX,
    /// Text record.
    TXT,
    /// IPv6 host address.
    AAAA,
    /// Service locator.
    SRV,
    /// Certification authority authorization.
    CAA,
    /// Anything else, carried by value.
    Other(u16),
}

impl RecordType {
    /// Maps a wire value to a record type.
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            15 => Self::MX,
            16 => Self::TXT,
            28 => Self::AAAA,
            33 => Self::SRV,
            257 => Self::CAA,
            other => Self::Other(other),
        }
    }

    /// Returns the wire value.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::NS => 2,
            Self::CNAME => 5,
            Self::SOA => 6,
            Self::PTR => 12,
            Self::MX => 15,
            Self::TXT => 16,
            Self::AAAA => 28,
            Self::SRV => 33,
            Self::CAA => 257,
            Self::Other(value) => value,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::NS => write!(f, "NS"),
            Self::CNAME => write!(f, "CNAME"),
            Self::SOA => write!(f, "SOA"),
            Self::PTR => write!(f, "PTR"),
            Self::MX => write!(f, "MX"),
            Self::TXT => write!(f, "TXT"),
            Self::AAAA => write!(f, "AAAA"),
            Self::SRV => write!(f, "SRV"),
            Self::CAA => write!(f, "CAA"),
            Self::Other(value) => write!(f, "TYPE{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for value in [1u16, 2, 5, 6, 12, 15, 16, 28, 33, 257, 64000] {
            assert_eq!(RecordType::from_u16(value).to_u16(), value);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(RecordType::A.to_string(), "A");
        assert_eq!(RecordType::AAAA.to_string(), "AAAA");
        assert_eq!(RecordType::Other(999).to_string(), "TYPE999");
    }
}
