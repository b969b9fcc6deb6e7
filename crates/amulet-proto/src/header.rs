//! DNS message header.
//!
//! The header is a fixed 12-byte structure of six big-endian 16-bit fields.
//! The flags word packs, from the most significant bit: QR(1), OPCODE(4),
//! AA(1), TC(1), RD(1), RA(1), Z(3), RCODE(4).

use crate::error::{Error, Result};
use crate::rcode;
use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Size of the DNS header in bytes.
pub const HEADER_SIZE: usize = 12;

bitflags! {
    /// Single-bit DNS header flags.
    ///
    /// The OPCODE and RCODE fields share the same word but are multi-bit;
    /// they are accessed through [`Header::opcode`] and [`Header::rcode`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        /// Query/Response: 0 = query, 1 = response.
        const QR = 0x8000;

        /// Authoritative Answer.
        const AA = 0x0400;

        /// Truncation.
        const TC = 0x0200;

        /// Recursion Desired.
        const RD = 0x0100;

        /// Recursion Available.
        const RA = 0x0080;
    }
}

/// Mask of the 4-bit response code in the flags word.
pub const RCODE_MASK: u16 = 0x000F;

/// DNS message header.
///
/// The flags word is kept raw: the resolver mutates a query header in place
/// into the response header, and splices upstream response codes into the
/// low nibble without touching the rest of the word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message identifier, echoed in responses.
    pub id: u16,

    /// Raw flags word.
    pub flags: u16,

    /// Number of questions.
    pub qdcount: u16,

    /// Number of answer records.
    pub ancount: u16,

    /// Number of authority records.
    pub nscount: u16,

    /// Number of additional records.
    pub arcount: u16,
}

impl Header {
    /// Creates a zeroed header with the given message ID.
    #[inline]
    pub const fn new(id: u16) -> Self {
        Self {
            id,
            flags: 0,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        }
    }

    /// Parses a header from wire format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::malformed_header(data.len()));
        }

        Ok(Self {
            id: u16::from_be_bytes([data[0], data[1]]),
            flags: u16::from_be_bytes([data[2], data[3]]),
            qdcount: u16::from_be_bytes([data[4], data[5]]),
            ancount: u16::from_be_bytes([data[6], data[7]]),
            nscount: u16::from_be_bytes([data[8], data[9]]),
            arcount: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    /// Serializes the header to wire format.
    pub fn to_wire(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.flags.to_be_bytes());
        buf[4..6].copy_from_slice(&self.qdcount.to_be_bytes());
        buf[6..8].copy_from_slice(&self.ancount.to_be_bytes());
        buf[8..10].copy_from_slice(&self.nscount.to_be_bytes());
        buf[10..12].copy_from_slice(&self.arcount.to_be_bytes());
        buf
    }

    /// Appends the header to a buffer.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.to_wire());
    }

    /// Returns true if the QR bit is set.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags & Flags::QR.bits() != 0
    }

    /// Marks the message as a response.
    #[inline]
    pub fn set_response(&mut self) {
        self.flags |= Flags::QR.bits();
    }

    /// Returns true if the client requested recursion.
    #[inline]
    pub fn recursion_desired(&self) -> bool {
        self.flags & Flags::RD.bits() != 0
    }

    /// Advertises recursion availability.
    #[inline]
    pub fn set_recursion_available(&mut self) {
        self.flags |= Flags::RA.bits();
    }

    /// Returns the 4-bit opcode.
    #[inline]
    pub fn opcode(&self) -> u8 {
        ((self.flags >> 11) & 0x0F) as u8
    }

    /// Returns the 4-bit response code.
    #[inline]
    pub fn rcode(&self) -> u8 {
        (self.flags & RCODE_MASK) as u8
    }

    /// Splices a response code into the low nibble of the flags word.
    #[inline]
    pub fn set_rcode(&mut self, rcode: u8) {
        self.flags = (self.flags & !RCODE_MASK) | u16::from(rcode & 0x0F);
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID:{:04X} {} op:{} {} QD:{} AN:{} NS:{} AR:{}",
            self.id,
            if self.is_response() { "resp" } else { "query" },
            self.opcode(),
            rcode::name(self.rcode()),
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount
        )
    }
}
