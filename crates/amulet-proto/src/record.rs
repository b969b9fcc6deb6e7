//! Answer resource records.

use bytes::{BufMut, Bytes, BytesMut};

/// A DNS answer record.
///
/// The `name` field holds the raw wire bytes exactly as received, which may
/// be a 2-byte compression pointer into the upstream message. The bytes are
/// echoed back to the client unchanged; rewriting them would invalidate the
/// pointer offsets, so nothing in this crate decompresses or canonicalizes
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Raw encoded name bytes (labels or compression pointer).
    pub name: Bytes,

    /// Record type.
    pub rtype: u16,

    /// Record class.
    pub rclass: u16,

    /// Time to live in seconds.
    pub ttl: u32,

    /// Declared rdata length.
    pub rdlength: u16,

    /// Record data, interpretation depends on `rtype`.
    pub rdata: Bytes,
}

impl Answer {
    /// Builds a locally synthesized answer; `rdlength` is derived from the
    /// data.
    pub fn synthesize(name: Bytes, rtype: u16, rclass: u16, ttl: u32, rdata: Bytes) -> Self {
        Self {
            name,
            rtype,
            rclass,
            ttl,
            rdlength: rdata.len() as u16,
            rdata,
        }
    }

    /// Appends the wire encoding to a buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.name);
        buf.put_u16(self.rtype);
        buf.put_u16(self.rclass);
        buf.put_u32(self.ttl);
        buf.put_u16(self.rdlength);
        buf.put_slice(&self.rdata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_sets_rdlength() {
        let answer = Answer::synthesize(
            Bytes::from_static(&[3, b'f', b'o', b'o', 0]),
            1,
            1,
            600,
            Bytes::from_static(&[192, 168, 1, 10]),
        );
        assert_eq!(answer.rdlength, 4);
    }

    #[test]
    fn test_encode_with_pointer_name() {
        let answer = Answer::synthesize(
            Bytes::from_static(&[0xC0, 0x0C]),
            1,
            1,
            60,
            Bytes::from_static(&[8, 8, 8, 8]),
        );

        let mut buf = BytesMut::new();
        answer.encode(&mut buf);

        assert_eq!(
            &buf[..],
            &[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 8, 8, 8, 8]
        );
    }
}
