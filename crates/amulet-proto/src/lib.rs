//! # Amulet DNS Protocol Library
//!
//! Wire format types and codec for the Amulet filtering resolver, following
//! RFC 1035 for the message framing Amulet actually speaks.
//!
//! The codec is deliberately narrow: queries carry a single question, and
//! responses carry the question plus answer records. Answer names are kept
//! as the raw bytes received from upstream (including compression pointers)
//! so that responses can be spliced back to clients without re-compressing
//! the message.
//!
//! ## Example
//!
//! ```rust,ignore
//! use amulet_proto::Message;
//!
//! let query = Message::parse(&datagram)?;
//! let answers = Message::decode_answers(&upstream_reply)?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod rcode;
pub mod record;
pub mod rtype;

pub use error::{Error, Result};
pub use header::{Flags, Header, HEADER_SIZE};
pub use message::Message;
pub use question::Question;
pub use record::Answer;
pub use rtype::RecordType;

/// Maximum length of a DNS label (63 bytes per RFC 1035).
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum encoded length of a domain name (255 bytes per RFC 1035).
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum size of a plain UDP DNS message (512 bytes per RFC 1035).
pub const MAX_UDP_MESSAGE_SIZE: usize = 512;

/// Ceiling for DoH request bodies (64 KiB).
pub const MAX_DOH_MESSAGE_SIZE: usize = 65536;

/// DNS port (53).
pub const DNS_PORT: u16 = 53;

/// DNS over HTTPS default port (443).
pub const DOH_PORT: u16 = 443;
