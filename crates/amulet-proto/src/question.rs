//! DNS question section.

use crate::error::{Error, Result};
use crate::name;
use crate::rtype::RecordType;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// A DNS question: the `(name, type, class)` triple a client asks about.
///
/// The wire format allows several questions per message; Amulet decodes and
/// encodes exactly one, which is what every real stub resolver sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Queried domain name, dotted, case preserved as received.
    pub name: String,

    /// Query type.
    pub qtype: u16,

    /// Query class (1 = IN for essentially all traffic).
    pub qclass: u16,
}

impl Question {
    /// Creates a new question.
    pub fn new(name: impl Into<String>, qtype: u16, qclass: u16) -> Self {
        Self {
            name: name.into(),
            qtype,
            qclass,
        }
    }

    /// Decodes a question starting at `offset` (normally 12, right after
    /// the header).
    ///
    /// Walks length-prefixed labels until the terminating zero byte. Fails
    /// with [`Error::MalformedQuestion`] if a label runs past the buffer or
    /// fewer than four bytes remain for the type and class fields.
    pub fn parse_at(data: &[u8], mut offset: usize) -> Result<Self> {
        let mut labels: Vec<String> = Vec::new();

        loop {
            let length = *data
                .get(offset)
                .ok_or(Error::MalformedQuestion { offset })? as usize;
            if length == 0 {
                offset += 1;
                break;
            }

            offset += 1;
            if offset + length > data.len() {
                return Err(Error::malformed_question(offset));
            }
            labels.push(String::from_utf8_lossy(&data[offset..offset + length]).into_owned());
            offset += length;
        }

        if offset + 4 > data.len() {
            return Err(Error::malformed_question(offset));
        }

        let qtype = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let qclass = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);

        Ok(Self {
            name: labels.join("."),
            qtype,
            qclass,
        })
    }

    /// Appends the wire encoding to a buffer.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        name::append(buf, &self.name)?;
        buf.put_u16(self.qtype);
        buf.put_u16(self.qclass);
        Ok(())
    }

    /// Returns the query type as a displayable record type.
    pub fn record_type(&self) -> RecordType {
        RecordType::from_u16(self.qtype)
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.record_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(question: &Question) -> BytesMut {
        let mut buf = BytesMut::new();
        question.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_question_roundtrip() {
        let question = Question::new("example.com", 1, 1);
        let buf = encoded(&question);

        let parsed = Question::parse_at(&buf, 0).unwrap();
        assert_eq!(parsed, question);
    }

    #[test]
    fn test_case_preserved() {
        let question = Question::new("ExAmPle.COM", 28, 1);
        let buf = encoded(&question);

        let parsed = Question::parse_at(&buf, 0).unwrap();
        assert_eq!(parsed.name, "ExAmPle.COM");
    }

    #[test]
    fn test_label_overruns_buffer() {
        // Label claims 10 bytes but only 3 follow
        let data = [10, b'a', b'b', b'c'];
        let result = Question::parse_at(&data, 0);
        assert!(matches!(result, Err(Error::MalformedQuestion { .. })));
    }

    #[test]
    fn test_missing_type_and_class() {
        // Name terminates but only two bytes remain
        let data = [1, b'a', 0, 0, 1];
        let result = Question::parse_at(&data, 0);
        assert!(matches!(result, Err(Error::MalformedQuestion { .. })));
    }

    #[test]
    fn test_empty_buffer() {
        let result = Question::parse_at(&[], 0);
        assert!(matches!(result, Err(Error::MalformedQuestion { offset: 0 })));
    }

    #[test]
    fn test_display() {
        let question = Question::new("example.com", 1, 1);
        assert_eq!(question.to_string(), "example.com A");
    }
}
